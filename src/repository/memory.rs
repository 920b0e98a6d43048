//! In-memory repositories and Unit of Work
//!
//! Committed state lives in one `Arc<RwLock<MemoryState>>`. While a unit is
//! open its repositories record written rows in a private change set and read
//! through it onto the committed state. `commit()` merges only those rows into
//! the committed state, `rollback()` drops them.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::{Account, AccountState, Transaction, TransactionState};

use super::{AccountRepository, RepositoryError, TransactionRepository, UnitOfWork};

/// Rows of the store; also used as the change set of an open unit
#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: HashMap<Uuid, AccountState>,
    deleted_accounts: HashSet<Uuid>,
    transactions: HashMap<Uuid, TransactionState>,
}

impl MemoryState {
    fn merge(&mut self, changes: MemoryState) {
        self.accounts.extend(changes.accounts);
        self.deleted_accounts.extend(changes.deleted_accounts);
        self.transactions.extend(changes.transactions);
    }

    /// Committed rows with `changes` laid over them
    fn overlaid(&self, changes: &MemoryState) -> MemoryState {
        let mut view = self.clone();
        view.merge(changes.clone());
        view
    }
}

/// Where a repository handle reads and writes
#[derive(Clone)]
enum MemoryTarget {
    Committed(Arc<RwLock<MemoryState>>),
    Staged {
        committed: Arc<RwLock<MemoryState>>,
        /// `None` once the owning transaction committed or rolled back
        changes: Arc<RwLock<Option<MemoryState>>>,
    },
}

impl MemoryTarget {
    async fn read<R, F>(&self, f: F) -> Result<R, RepositoryError>
    where
        F: FnOnce(&MemoryState) -> R + Send,
    {
        match self {
            MemoryTarget::Committed(state) => Ok(f(&*state.read().await)),
            MemoryTarget::Staged { committed, changes } => {
                let changes = changes.read().await;
                let changes = changes.as_ref().ok_or(RepositoryError::TransactionClosed)?;
                let view = committed.read().await.overlaid(changes);
                Ok(f(&view))
            }
        }
    }

    /// `f` sees the current rows and returns the rows it writes
    async fn write<R, F>(&self, f: F) -> Result<R, RepositoryError>
    where
        F: FnOnce(&MemoryState) -> (R, MemoryState) + Send,
    {
        match self {
            MemoryTarget::Committed(state) => {
                let mut state = state.write().await;
                let (result, written) = f(&*state);
                state.merge(written);
                Ok(result)
            }
            MemoryTarget::Staged { committed, changes } => {
                let mut changes = changes.write().await;
                let changes = changes.as_mut().ok_or(RepositoryError::TransactionClosed)?;
                let view = committed.read().await.overlaid(changes);
                let (result, written) = f(&view);
                changes.merge(written);
                Ok(result)
            }
        }
    }
}

/// Shared in-memory database
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh, idle Unit of Work over this store
    pub fn unit_of_work(&self) -> InMemoryUnitOfWork {
        InMemoryUnitOfWork {
            store: Arc::clone(&self.state),
            changes: None,
        }
    }

    /// Non-transactional account repository
    pub fn account_repository(&self) -> Arc<dyn AccountRepository> {
        Arc::new(InMemoryAccountRepository {
            target: MemoryTarget::Committed(Arc::clone(&self.state)),
        })
    }

    /// Non-transactional transaction repository
    pub fn transaction_repository(&self) -> Arc<dyn TransactionRepository> {
        Arc::new(InMemoryTransactionRepository {
            target: MemoryTarget::Committed(Arc::clone(&self.state)),
        })
    }
}

/// Unit of Work over an [`InMemoryStore`]
pub struct InMemoryUnitOfWork {
    store: Arc<RwLock<MemoryState>>,
    changes: Option<Arc<RwLock<Option<MemoryState>>>>,
}

impl InMemoryUnitOfWork {
    fn target(&self) -> MemoryTarget {
        match &self.changes {
            Some(changes) => MemoryTarget::Staged {
                committed: Arc::clone(&self.store),
                changes: Arc::clone(changes),
            },
            None => MemoryTarget::Committed(Arc::clone(&self.store)),
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn begin(&mut self) -> Result<(), RepositoryError> {
        if self.changes.is_some() {
            return Err(RepositoryError::TransactionAlreadyInProgress);
        }
        self.changes = Some(Arc::new(RwLock::new(Some(MemoryState::default()))));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), RepositoryError> {
        let changes = self
            .changes
            .take()
            .ok_or(RepositoryError::NoTransactionInProgress)?;
        let written = changes
            .write()
            .await
            .take()
            .ok_or(RepositoryError::TransactionClosed)?;
        self.store.write().await.merge(written);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), RepositoryError> {
        let changes = self
            .changes
            .take()
            .ok_or(RepositoryError::NoTransactionInProgress)?;
        changes.write().await.take();
        Ok(())
    }

    fn is_in_transaction(&self) -> bool {
        self.changes.is_some()
    }

    fn account_repository(&self) -> Arc<dyn AccountRepository> {
        Arc::new(InMemoryAccountRepository {
            target: self.target(),
        })
    }

    fn transaction_repository(&self) -> Arc<dyn TransactionRepository> {
        Arc::new(InMemoryTransactionRepository {
            target: self.target(),
        })
    }
}

pub struct InMemoryAccountRepository {
    target: MemoryTarget,
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, RepositoryError> {
        self.target
            .read(|s| {
                s.accounts
                    .get(&id)
                    .filter(|_| !s.deleted_accounts.contains(&id))
                    .cloned()
                    .map(Account::from_db_state)
            })
            .await
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Account>, RepositoryError> {
        self.target
            .read(|s| {
                let mut states: Vec<&AccountState> = s
                    .accounts
                    .values()
                    .filter(|a| a.user_id == user_id && !s.deleted_accounts.contains(&a.id))
                    .collect();
                states.sort_by_key(|a| (a.created_at, a.id));
                states
                    .into_iter()
                    .cloned()
                    .map(Account::from_db_state)
                    .collect()
            })
            .await
    }

    async fn save(&self, account: &Account) -> Result<(), RepositoryError> {
        let state = account.to_state();
        self.target
            .write(move |_| {
                let mut written = MemoryState::default();
                written.accounts.insert(state.id, state);
                ((), written)
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.target
            .write(|s| {
                let mut written = MemoryState::default();
                let Some(account) = s.accounts.get(&id) else {
                    return (false, written);
                };
                if s.deleted_accounts.contains(&id) {
                    return (false, written);
                }
                let mut account = account.clone();
                account.is_active = false;
                account.updated_at = Utc::now();
                written.accounts.insert(id, account);
                written.deleted_accounts.insert(id);
                (true, written)
            })
            .await
    }
}

pub struct InMemoryTransactionRepository {
    target: MemoryTarget,
}

impl InMemoryTransactionRepository {
    async fn find_live<F>(&self, predicate: F) -> Result<Vec<Transaction>, RepositoryError>
    where
        F: Fn(&TransactionState) -> bool + Send + Sync,
    {
        self.target
            .read(|s| {
                let mut states: Vec<&TransactionState> = s
                    .transactions
                    .values()
                    .filter(|t| t.deleted_at.is_none() && predicate(t))
                    .collect();
                states.sort_by_key(|t| (t.date, t.created_at, t.id));
                states
                    .into_iter()
                    .cloned()
                    .map(Transaction::from_db_state)
                    .collect()
            })
            .await
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, RepositoryError> {
        Ok(self.find_live(|t| t.id == id).await?.into_iter().next())
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Transaction>, RepositoryError> {
        self.find_live(|t| t.user_id == user_id).await
    }

    async fn save(&self, transaction: &Transaction) -> Result<(), RepositoryError> {
        let state = transaction.to_state();
        self.target
            .write(move |_| {
                let mut written = MemoryState::default();
                written.transactions.insert(state.id, state);
                ((), written)
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.target
            .write(|s| {
                let mut written = MemoryState::default();
                match s.transactions.get(&id) {
                    Some(t) if t.deleted_at.is_none() => {
                        let now = Utc::now();
                        let mut t = t.clone();
                        t.deleted_at = Some(now);
                        t.updated_at = now;
                        written.transactions.insert(id, t);
                        (true, written)
                    }
                    _ => (false, written),
                }
            })
            .await
    }

    async fn find_active_recurring_transactions(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        self.find_live(|t| {
            t.is_recurring
                && t.parent_transaction_id.is_none()
                && t.recurrence_end_date.map_or(true, |end| end >= today)
        })
        .await
    }

    async fn find_by_parent_id_and_date(
        &self,
        parent_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Transaction>, RepositoryError> {
        Ok(self
            .find_live(|t| t.parent_transaction_id == Some(parent_id) && t.date == date)
            .await?
            .into_iter()
            .next())
    }

    async fn find_latest_by_parent_id(
        &self,
        parent_id: Uuid,
    ) -> Result<Option<Transaction>, RepositoryError> {
        Ok(self
            .find_live(|t| t.parent_transaction_id == Some(parent_id))
            .await?
            .pop())
    }
}
