//! Recurring Transaction Processor
//!
//! Single-shot batch that materializes the next due occurrence of every
//! active recurring template. An external scheduler decides when it runs.
//!
//! Instances are written through the bare transaction repository and their
//! `TransactionCreated` events go out with `balance_applied = false`, so the
//! account balance only moves once the balance projection handles them.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Transaction};
use crate::error::AppError;
use crate::event_bus::EventBus;
use crate::handlers::dispatch::publish_committed;
use crate::repository::TransactionRepository;

/// Counts from one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecurringRunReport {
    /// Instances materialized in this run
    pub created: usize,
    /// Templates not due, past their end date or already materialized
    pub skipped: usize,
    /// Templates that errored; the batch moved on
    pub failed: usize,
}

impl RecurringRunReport {
    pub fn templates_seen(&self) -> usize {
        self.created + self.skipped + self.failed
    }
}

/// What happened to one template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created { instance_id: Uuid, date: NaiveDate },
    NotDue(NaiveDate),
    Ended(NaiveDate),
    AlreadyMaterialized(NaiveDate),
}

/// Batch processor for recurring templates
pub struct RecurringTransactionProcessor {
    transactions: Arc<dyn TransactionRepository>,
    event_bus: Arc<EventBus>,
}

impl RecurringTransactionProcessor {
    pub fn new(transactions: Arc<dyn TransactionRepository>, event_bus: Arc<EventBus>) -> Self {
        Self {
            transactions,
            event_bus,
        }
    }

    /// Run against the current UTC date
    pub async fn run_for_today(&self) -> Result<RecurringRunReport, AppError> {
        self.run(Utc::now().date_naive()).await
    }

    /// Materialize at most one occurrence per active template.
    ///
    /// Only loading the templates can fail the run; errors on a single
    /// template are logged and counted in `failed`.
    pub async fn run(&self, today: NaiveDate) -> Result<RecurringRunReport, AppError> {
        let templates = self
            .transactions
            .find_active_recurring_transactions(today)
            .await?;
        let mut report = RecurringRunReport::default();

        for template in &templates {
            match self.process_template(template, today).await {
                Ok(Outcome::Created { instance_id, date }) => {
                    tracing::info!(
                        template_id = %template.id(),
                        instance_id = %instance_id,
                        date = %date,
                        "Recurring transaction materialized"
                    );
                    report.created += 1;
                }
                Ok(Outcome::NotDue(date)) => {
                    tracing::debug!(template_id = %template.id(), next = %date, "Recurring template not due yet");
                    report.skipped += 1;
                }
                Ok(Outcome::Ended(date)) => {
                    tracing::debug!(template_id = %template.id(), next = %date, "Recurring template past its end date");
                    report.skipped += 1;
                }
                Ok(Outcome::AlreadyMaterialized(date)) => {
                    tracing::warn!(
                        template_id = %template.id(),
                        date = %date,
                        "Occurrence already materialized, skipping"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(
                        template_id = %template.id(),
                        error = %e,
                        "Recurring template failed, continuing with the next one"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            today = %today,
            templates = templates.len(),
            created = report.created,
            skipped = report.skipped,
            failed = report.failed,
            "Recurring batch finished"
        );
        Ok(report)
    }

    async fn process_template(
        &self,
        template: &Transaction,
        today: NaiveDate,
    ) -> Result<Outcome, AppError> {
        let frequency = template.recurrence_frequency().ok_or_else(|| {
            AppError::Internal(format!("template {} has no frequency", template.id()))
        })?;

        // Catch-up: the occurrence after the newest instance, not the newest due date
        let last_date = match self.transactions.find_latest_by_parent_id(template.id()).await? {
            Some(latest) => latest.date().max(template.date()),
            None => template.date(),
        };
        let candidate = frequency
            .next_occurrence_after(template.date(), last_date)
            .ok_or_else(|| {
                AppError::Internal(format!("next occurrence after {} is out of range", last_date))
            })?;

        if candidate > today {
            return Ok(Outcome::NotDue(candidate));
        }
        if template.recurrence_end_date().is_some_and(|end| candidate > end) {
            return Ok(Outcome::Ended(candidate));
        }
        if self
            .transactions
            .find_by_parent_id_and_date(template.id(), candidate)
            .await?
            .is_some()
        {
            return Ok(Outcome::AlreadyMaterialized(candidate));
        }

        let mut instance = template.materialize(candidate)?;
        self.transactions.save(&instance).await?;
        publish_committed(&self.event_bus, instance.drain_events(), false).await;

        Ok(Outcome::Created {
            instance_id: instance.id(),
            date: candidate,
        })
    }
}
