//! Transaction Recorder
//!
//! Eventually consistent variant of the transaction use cases: only the
//! transaction is written, and the account balance follows once
//! [`BalanceProjection`](crate::projection::BalanceProjection) handles the
//! published event.

use std::sync::Arc;

use crate::aggregate::{Aggregate, Transaction};
use crate::error::AppError;
use crate::event_bus::EventBus;
use crate::repository::TransactionRepository;

use super::dispatch::publish_committed;
use super::{
    CreateTransactionCommand, DeleteTransactionCommand, TransactionResult,
    UpdateTransactionCommand,
};

/// Writes transactions and leaves the balance to event subscribers
#[derive(Clone)]
pub struct TransactionRecorder {
    transactions: Arc<dyn TransactionRepository>,
    event_bus: Arc<EventBus>,
}

impl TransactionRecorder {
    pub fn new(transactions: Arc<dyn TransactionRepository>, event_bus: Arc<EventBus>) -> Self {
        Self {
            transactions,
            event_bus,
        }
    }

    /// Save a new transaction and publish `TransactionCreated`
    pub async fn create(
        &self,
        command: CreateTransactionCommand,
    ) -> Result<TransactionResult, AppError> {
        let transaction = Transaction::create(command.parse()?)?;
        self.transactions.save(&transaction).await?;

        tracing::info!(
            transaction_id = %transaction.id(),
            account_id = %transaction.account_id(),
            "Transaction recorded, balance pending"
        );
        Ok(self.finish(transaction).await)
    }

    /// Save changes and publish `TransactionUpdated` with both sides
    pub async fn update(
        &self,
        command: UpdateTransactionCommand,
    ) -> Result<TransactionResult, AppError> {
        let transaction_id = command.transaction_id()?;
        let mut transaction = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound(transaction_id))?;

        let changes = command.changes_for(&transaction)?;
        transaction.update(changes)?;
        self.transactions.save(&transaction).await?;

        tracing::info!(transaction_id = %transaction_id, "Transaction update recorded, balance pending");
        Ok(self.finish(transaction).await)
    }

    /// Soft-delete and publish `TransactionDeleted`
    pub async fn delete(
        &self,
        command: DeleteTransactionCommand,
    ) -> Result<TransactionResult, AppError> {
        let transaction_id = command.transaction_id()?;
        let mut transaction = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound(transaction_id))?;

        transaction.mark_deleted()?;
        self.transactions.delete(transaction_id).await?;

        tracing::info!(transaction_id = %transaction_id, "Transaction deletion recorded, balance pending");
        Ok(self.finish(transaction).await)
    }

    async fn finish(&self, mut transaction: Transaction) -> TransactionResult {
        let result = TransactionResult::from_transaction(&transaction);
        publish_committed(&self.event_bus, transaction.drain_events(), false).await;
        result
    }
}
