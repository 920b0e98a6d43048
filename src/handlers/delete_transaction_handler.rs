//! Delete Transaction Handler

use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Account, Aggregate, Transaction};
use crate::error::AppError;
use crate::event_bus::EventBus;
use crate::repository::UnitOfWork;

use super::dispatch::{publish_committed, rollback_if_open};
use super::{DeleteTransactionCommand, TransactionResult};

/// Handler for soft-deleting a transaction and reverting its balance effect
pub struct DeleteTransactionHandler {
    uow: Box<dyn UnitOfWork>,
    event_bus: Arc<EventBus>,
}

impl DeleteTransactionHandler {
    pub fn new(uow: Box<dyn UnitOfWork>, event_bus: Arc<EventBus>) -> Self {
        Self { uow, event_bus }
    }

    /// Execute the delete command
    pub async fn execute(
        &mut self,
        command: DeleteTransactionCommand,
    ) -> Result<TransactionResult, AppError> {
        let transaction_id = command.transaction_id()?;

        self.uow.begin().await?;
        let outcome = self.persist(transaction_id).await;
        rollback_if_open(self.uow.as_mut()).await;
        let (mut transaction, account) = outcome?;

        tracing::info!(
            transaction_id = %transaction_id,
            account_id = %account.id(),
            balance = %account.balance(),
            "Transaction deleted"
        );

        let result = TransactionResult::from_transaction(&transaction).with_balance(account.balance());
        publish_committed(&self.event_bus, transaction.drain_events(), true).await;

        Ok(result)
    }

    async fn persist(&mut self, transaction_id: Uuid) -> Result<(Transaction, Account), AppError> {
        let transactions = self.uow.transaction_repository();
        let accounts = self.uow.account_repository();

        let mut transaction = transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound(transaction_id))?;
        let mut account = accounts
            .find_by_id(transaction.account_id())
            .await?
            .ok_or(AppError::AccountNotFound(transaction.account_id()))?;

        account.revert_transaction(transaction.transaction_type(), transaction.amount())?;
        accounts.save(&account).await?;

        transaction.mark_deleted()?;
        transactions.delete(transaction_id).await?;

        self.uow.commit().await?;
        Ok((transaction, account))
    }
}
