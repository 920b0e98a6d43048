//! Update Transaction Handler

use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Account, Aggregate, Transaction};
use crate::error::AppError;
use crate::event_bus::EventBus;
use crate::repository::UnitOfWork;

use super::dispatch::{publish_committed, rollback_if_open};
use super::{TransactionResult, UpdateTransactionCommand};

/// Handler for changing a transaction and re-balancing its account atomically
pub struct UpdateTransactionHandler {
    uow: Box<dyn UnitOfWork>,
    event_bus: Arc<EventBus>,
}

impl UpdateTransactionHandler {
    pub fn new(uow: Box<dyn UnitOfWork>, event_bus: Arc<EventBus>) -> Self {
        Self { uow, event_bus }
    }

    /// Execute the update command.
    ///
    /// The old effect is reverted and the new one applied to the account in
    /// the same Unit of Work that rewrites the transaction.
    pub async fn execute(
        &mut self,
        command: UpdateTransactionCommand,
    ) -> Result<TransactionResult, AppError> {
        let transaction_id = command.transaction_id()?;

        self.uow.begin().await?;
        let outcome = self.persist(transaction_id, &command).await;
        rollback_if_open(self.uow.as_mut()).await;
        let (mut transaction, account) = outcome?;

        tracing::info!(
            transaction_id = %transaction_id,
            account_id = %account.id(),
            transaction_type = %transaction.transaction_type(),
            amount = %transaction.amount(),
            balance = %account.balance(),
            "Transaction updated"
        );

        let result = TransactionResult::from_transaction(&transaction).with_balance(account.balance());
        publish_committed(&self.event_bus, transaction.drain_events(), true).await;

        Ok(result)
    }

    async fn persist(
        &mut self,
        transaction_id: Uuid,
        command: &UpdateTransactionCommand,
    ) -> Result<(Transaction, Account), AppError> {
        let transactions = self.uow.transaction_repository();
        let accounts = self.uow.account_repository();

        let mut transaction = transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound(transaction_id))?;
        let changes = command.changes_for(&transaction)?;

        let old_type = transaction.transaction_type();
        let old_amount = transaction.amount().clone();
        transaction.update(changes)?;

        let mut account = accounts
            .find_by_id(transaction.account_id())
            .await?
            .ok_or(AppError::AccountNotFound(transaction.account_id()))?;
        account.revert_transaction(old_type, &old_amount)?;
        account.apply_transaction(transaction.transaction_type(), transaction.amount())?;

        accounts.save(&account).await?;
        transactions.save(&transaction).await?;

        self.uow.commit().await?;
        Ok((transaction, account))
    }
}
