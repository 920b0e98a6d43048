//! Create Transaction Handler
//!
//! Records a transaction and moves its account balance in one Unit of Work.

use std::sync::Arc;

use crate::aggregate::{Account, Aggregate, NewTransaction, Transaction};
use crate::error::AppError;
use crate::event_bus::EventBus;
use crate::repository::UnitOfWork;

use super::dispatch::{publish_committed, rollback_if_open};
use super::{CreateTransactionCommand, TransactionResult};

/// Handler for recording an income or expense with immediate balance effect
pub struct CreateTransactionHandler {
    uow: Box<dyn UnitOfWork>,
    event_bus: Arc<EventBus>,
}

impl CreateTransactionHandler {
    pub fn new(uow: Box<dyn UnitOfWork>, event_bus: Arc<EventBus>) -> Self {
        Self { uow, event_bus }
    }

    /// Execute the create command.
    ///
    /// The transaction row and the account balance commit together or not at
    /// all. Events are published after commit with `balance_applied` set.
    pub async fn execute(
        &mut self,
        command: CreateTransactionCommand,
    ) -> Result<TransactionResult, AppError> {
        let new = command.parse()?;

        self.uow.begin().await?;
        let outcome = self.persist(new).await;
        rollback_if_open(self.uow.as_mut()).await;
        let (mut transaction, account) = outcome?;

        tracing::info!(
            transaction_id = %transaction.id(),
            account_id = %account.id(),
            transaction_type = %transaction.transaction_type(),
            amount = %transaction.amount(),
            balance = %account.balance(),
            "Transaction created"
        );

        let result = TransactionResult::from_transaction(&transaction).with_balance(account.balance());
        publish_committed(&self.event_bus, transaction.drain_events(), true).await;

        Ok(result)
    }

    async fn persist(&mut self, new: NewTransaction) -> Result<(Transaction, Account), AppError> {
        let transactions = self.uow.transaction_repository();
        let accounts = self.uow.account_repository();

        let transaction = Transaction::create(new)?;

        // Account first: its row stays locked until commit
        let mut account = accounts
            .find_by_id(transaction.account_id())
            .await?
            .ok_or(AppError::AccountNotFound(transaction.account_id()))?;
        account.apply_transaction(transaction.transaction_type(), transaction.amount())?;

        transactions.save(&transaction).await?;
        accounts.save(&account).await?;

        self.uow.commit().await?;
        Ok((transaction, account))
    }
}
