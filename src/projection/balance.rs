//! Balance Projection
//!
//! Moves account balances from transaction events published with
//! `balance_applied = false`. Not atomic with the transaction write: a crash
//! between the two leaves the account behind until the event is replayed.

use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Account, Aggregate};
use crate::domain::events::kinds;
use crate::domain::{DomainEvent, Event, Money, TransactionType};
use crate::event_bus::{EventBus, EventHandler, RetryConfig};
use crate::repository::AccountRepository;

/// Name the projection registers under on the event bus
pub const HANDLER_NAME: &str = "balance_projection";

/// Event handler that keeps account balances in step with transactions
pub struct BalanceProjection {
    accounts: Arc<dyn AccountRepository>,
}

impl BalanceProjection {
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self { accounts }
    }

    /// Subscribe to the three transaction event kinds, with retry when given
    pub fn register(self: Arc<Self>, event_bus: &EventBus, retry: Option<RetryConfig>) {
        for kind in [
            kinds::TRANSACTION_CREATED,
            kinds::TRANSACTION_UPDATED,
            kinds::TRANSACTION_DELETED,
        ] {
            let handler: Arc<dyn EventHandler> = self.clone();
            match retry.clone() {
                Some(config) => event_bus.subscribe_with_retry(kind, handler, config, HANDLER_NAME),
                None => event_bus.subscribe_named(kind, HANDLER_NAME, handler),
            }
        }
    }

    async fn load(&self, account_id: Uuid) -> anyhow::Result<Account> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .with_context(|| format!("account {} not found", account_id))
    }

    async fn apply(
        &self,
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: &Money,
    ) -> anyhow::Result<Account> {
        let mut account = self.load(account_id).await?;
        account.apply_transaction(transaction_type, amount)?;
        self.accounts.save(&account).await?;
        Ok(account)
    }

    async fn revert(
        &self,
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: &Money,
    ) -> anyhow::Result<Account> {
        let mut account = self.load(account_id).await?;
        account.revert_transaction(transaction_type, amount)?;
        self.accounts.save(&account).await?;
        Ok(account)
    }

    async fn replace(
        &self,
        account_id: Uuid,
        old: (TransactionType, &Money),
        new: (TransactionType, &Money),
    ) -> anyhow::Result<Account> {
        let mut account = self.load(account_id).await?;
        account.revert_transaction(old.0, old.1)?;
        account.apply_transaction(new.0, new.1)?;
        self.accounts.save(&account).await?;
        Ok(account)
    }
}

#[async_trait]
impl EventHandler for BalanceProjection {
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        if event.balance_applied() {
            tracing::debug!(
                event_kind = %event.event_kind(),
                aggregate_id = %event.aggregate_id(),
                "Balance already applied by publisher, skipping"
            );
            return Ok(());
        }

        let account = match event {
            DomainEvent::TransactionCreated(e) => {
                self.apply(e.account_id, e.transaction_type, &e.money()).await?
            }
            DomainEvent::TransactionDeleted(e) => {
                self.revert(e.account_id, e.transaction_type, &e.money()).await?
            }
            DomainEvent::TransactionUpdated(e) => {
                self.replace(
                    e.account_id,
                    (e.old_type, &e.old_money()),
                    (e.new_type, &e.new_money()),
                )
                .await?
            }
            DomainEvent::Generic(_) => return Ok(()),
        };

        tracing::debug!(
            event_kind = %event.event_kind(),
            transaction_id = %event.aggregate_id(),
            account_id = %account.id(),
            balance = %account.balance(),
            "Balance projection updated"
        );
        Ok(())
    }
}
