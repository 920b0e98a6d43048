//! Repository ports
//!
//! Storage-agnostic interfaces for the Account and Transaction aggregates and
//! the Unit of Work that spans them. All finders exclude soft-deleted rows.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Account, Transaction};

use super::RepositoryError;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, RepositoryError>;

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Account>, RepositoryError>;

    /// Insert or update
    async fn save(&self, account: &Account) -> Result<(), RepositoryError>;

    /// Soft delete; returns whether a live row was deleted
    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, RepositoryError>;

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Transaction>, RepositoryError>;

    /// Insert or update
    async fn save(&self, transaction: &Transaction) -> Result<(), RepositoryError>;

    /// Soft delete; returns whether a live row was deleted
    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError>;

    /// Templates (recurring, no parent) whose end date is unset or not before `today`
    async fn find_active_recurring_transactions(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<Transaction>, RepositoryError>;

    /// The instance of `parent_id` materialized for `date`, if any
    async fn find_by_parent_id_and_date(
        &self,
        parent_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Transaction>, RepositoryError>;

    /// The most recent (by date) instance of `parent_id`
    async fn find_latest_by_parent_id(
        &self,
        parent_id: Uuid,
    ) -> Result<Option<Transaction>, RepositoryError>;
}

/// One transaction boundary across the Account and Transaction repositories.
///
/// `Idle --begin()--> Open --{commit(), rollback()}--> Idle`. Repositories
/// requested while open are bound to the transaction; requested while idle
/// they use the ambient connection. A handle obtained before `begin()` stays
/// non-transactional. No rollback happens on its own: callers check
/// [`is_in_transaction`](UnitOfWork::is_in_transaction) on every exit path.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn begin(&mut self) -> Result<(), RepositoryError>;

    async fn commit(&mut self) -> Result<(), RepositoryError>;

    async fn rollback(&mut self) -> Result<(), RepositoryError>;

    fn is_in_transaction(&self) -> bool;

    fn account_repository(&self) -> Arc<dyn AccountRepository>;

    fn transaction_repository(&self) -> Arc<dyn TransactionRepository>;
}
