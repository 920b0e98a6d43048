//! PostgreSQL repositories and Unit of Work
//!
//! `PgUnitOfWork` owns at most one `sqlx::Transaction`. Repositories handed out
//! while it is open share that transaction through a slot that is emptied on
//! commit/rollback; repositories handed out while idle run on the pool.
//!
//! Single-row reads through a transaction-bound repository lock the row
//! (`FOR NO KEY UPDATE`) until the transaction ends, so two units that read and
//! then rewrite the same account balance run one after the other. The lock
//! mode still admits the key-share locks taken by foreign key checks.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction as SqlxTransaction};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::aggregate::{
    Account, AccountContext, AccountState, AccountType, Transaction, TransactionState,
};
use crate::domain::{Currency, Money, RecurrenceFrequency, TransactionType};

use super::{AccountRepository, RepositoryError, TransactionRepository, UnitOfWork};

type TxSlot = Arc<Mutex<Option<SqlxTransaction<'static, Postgres>>>>;
type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Connection a repository executes on
#[derive(Clone)]
enum PgConn {
    Pool(PgPool),
    Tx(TxSlot),
}

impl PgConn {
    /// Row lock appended to single-row reads
    fn row_lock(&self) -> &'static str {
        match self {
            PgConn::Pool(_) => "",
            PgConn::Tx(_) => " FOR NO KEY UPDATE",
        }
    }

    async fn execute(&self, query: PgQuery<'_>) -> Result<u64, RepositoryError> {
        let result = match self {
            PgConn::Pool(pool) => query.execute(pool).await?,
            PgConn::Tx(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or(RepositoryError::TransactionClosed)?;
                query.execute(&mut **tx).await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn fetch_optional(&self, query: PgQuery<'_>) -> Result<Option<PgRow>, RepositoryError> {
        let row = match self {
            PgConn::Pool(pool) => query.fetch_optional(pool).await?,
            PgConn::Tx(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or(RepositoryError::TransactionClosed)?;
                query.fetch_optional(&mut **tx).await?
            }
        };
        Ok(row)
    }

    async fn fetch_all(&self, query: PgQuery<'_>) -> Result<Vec<PgRow>, RepositoryError> {
        let rows = match self {
            PgConn::Pool(pool) => query.fetch_all(pool).await?,
            PgConn::Tx(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or(RepositoryError::TransactionClosed)?;
                query.fetch_all(&mut **tx).await?
            }
        };
        Ok(rows)
    }
}

// =========================================================================
// Unit of Work
// =========================================================================

/// Unit of Work over a PostgreSQL pool
pub struct PgUnitOfWork {
    pool: PgPool,
    tx: Option<TxSlot>,
}

impl PgUnitOfWork {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    fn conn(&self) -> PgConn {
        match &self.tx {
            Some(slot) => PgConn::Tx(Arc::clone(slot)),
            None => PgConn::Pool(self.pool.clone()),
        }
    }

    async fn take_open_transaction(
        &mut self,
    ) -> Result<SqlxTransaction<'static, Postgres>, RepositoryError> {
        let slot = self
            .tx
            .take()
            .ok_or(RepositoryError::NoTransactionInProgress)?;
        let tx = slot.lock().await.take();
        tx.ok_or(RepositoryError::TransactionClosed)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn begin(&mut self) -> Result<(), RepositoryError> {
        if self.tx.is_some() {
            return Err(RepositoryError::TransactionAlreadyInProgress);
        }
        let tx = self.pool.begin().await?;
        self.tx = Some(Arc::new(Mutex::new(Some(tx))));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), RepositoryError> {
        let tx = self.take_open_transaction().await?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), RepositoryError> {
        let tx = self.take_open_transaction().await?;
        tx.rollback().await?;
        Ok(())
    }

    fn is_in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    fn account_repository(&self) -> Arc<dyn AccountRepository> {
        Arc::new(PgAccountRepository { conn: self.conn() })
    }

    fn transaction_repository(&self) -> Arc<dyn TransactionRepository> {
        Arc::new(PgTransactionRepository { conn: self.conn() })
    }
}

// =========================================================================
// Account repository
// =========================================================================

const ACCOUNT_COLUMNS: &str = "id, user_id, name, account_type, balance, currency, context, \
                               is_active, created_at, updated_at";

pub struct PgAccountRepository {
    conn: PgConn,
}

impl PgAccountRepository {
    /// Non-transactional repository on the pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            conn: PgConn::Pool(pool),
        }
    }
}

fn row_to_account(row: &PgRow) -> Result<Account, RepositoryError> {
    let currency: String = row.try_get("currency")?;
    let account_type: String = row.try_get("account_type")?;
    let context: String = row.try_get("context")?;
    let balance: Decimal = row.try_get("balance")?;

    let currency = Currency::new(&currency).map_err(invalid_row)?;

    Ok(Account::from_db_state(AccountState {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        account_type: account_type.parse::<AccountType>().map_err(invalid_row)?,
        balance: Money::new(balance, currency),
        context: context.parse::<AccountContext>().map_err(invalid_row)?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE id = $1 AND deleted_at IS NULL{}",
            ACCOUNT_COLUMNS,
            self.conn.row_lock()
        );
        let row = self.conn.fetch_optional(sqlx::query(&sql).bind(id)).await?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Account>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE user_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at, id",
            ACCOUNT_COLUMNS
        );
        let rows = self.conn.fetch_all(sqlx::query(&sql).bind(user_id)).await?;
        rows.iter().map(row_to_account).collect()
    }

    async fn save(&self, account: &Account) -> Result<(), RepositoryError> {
        let state = account.to_state();
        let query = sqlx::query(
            r#"
            INSERT INTO accounts (
                id, user_id, name, account_type, balance, currency, context,
                is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                account_type = EXCLUDED.account_type,
                balance = EXCLUDED.balance,
                currency = EXCLUDED.currency,
                context = EXCLUDED.context,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(state.id)
        .bind(state.user_id)
        .bind(&state.name)
        .bind(state.account_type.as_str())
        .bind(state.balance.amount())
        .bind(state.balance.currency().code())
        .bind(state.context.as_str())
        .bind(state.is_active)
        .bind(state.created_at)
        .bind(state.updated_at);

        self.conn.execute(query).await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let query = sqlx::query(
            r#"
            UPDATE accounts
            SET deleted_at = NOW(), updated_at = NOW(), is_active = FALSE
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id);

        Ok(self.conn.execute(query).await? > 0)
    }
}

// =========================================================================
// Transaction repository
// =========================================================================

const TRANSACTION_COLUMNS: &str = "id, user_id, account_id, transaction_type, amount, currency, \
                                   description, date, is_recurring, recurrence_frequency, \
                                   recurrence_end_date, parent_transaction_id, created_at, \
                                   updated_at, deleted_at";

pub struct PgTransactionRepository {
    conn: PgConn,
}

impl PgTransactionRepository {
    /// Non-transactional repository on the pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            conn: PgConn::Pool(pool),
        }
    }

    async fn fetch_one_where(
        &self,
        filter: &str,
        bind_a: Uuid,
        bind_b: Option<NaiveDate>,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE {} AND deleted_at IS NULL \
             ORDER BY date DESC, created_at DESC LIMIT 1{}",
            TRANSACTION_COLUMNS,
            filter,
            self.conn.row_lock()
        );
        let mut query = sqlx::query(&sql).bind(bind_a);
        if let Some(date) = bind_b {
            query = query.bind(date);
        }
        let row = self.conn.fetch_optional(query).await?;
        row.as_ref().map(row_to_transaction).transpose()
    }
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction, RepositoryError> {
    let transaction_type: String = row.try_get("transaction_type")?;
    let amount: Decimal = row.try_get("amount")?;
    let currency: String = row.try_get("currency")?;
    let frequency: Option<String> = row.try_get("recurrence_frequency")?;
    let deleted_at: Option<DateTime<Utc>> = row.try_get("deleted_at")?;

    let currency = Currency::new(&currency).map_err(invalid_row)?;
    let recurrence_frequency = frequency
        .map(|f| f.parse::<RecurrenceFrequency>())
        .transpose()
        .map_err(invalid_row)?;

    Ok(Transaction::from_db_state(TransactionState {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        account_id: row.try_get("account_id")?,
        transaction_type: transaction_type
            .parse::<TransactionType>()
            .map_err(invalid_row)?,
        amount: Money::new(amount, currency),
        description: row.try_get("description")?,
        date: row.try_get("date")?,
        is_recurring: row.try_get("is_recurring")?,
        recurrence_frequency,
        recurrence_end_date: row.try_get("recurrence_end_date")?,
        parent_transaction_id: row.try_get("parent_transaction_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at,
    }))
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, RepositoryError> {
        self.fetch_one_where("id = $1", id, None).await
    }

    async fn find_by_user_id(&self, user_id: Uuid) -> Result<Vec<Transaction>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE user_id = $1 AND deleted_at IS NULL \
             ORDER BY date, created_at, id",
            TRANSACTION_COLUMNS
        );
        let rows = self.conn.fetch_all(sqlx::query(&sql).bind(user_id)).await?;
        rows.iter().map(row_to_transaction).collect()
    }

    async fn save(&self, transaction: &Transaction) -> Result<(), RepositoryError> {
        let state = transaction.to_state();
        let query = sqlx::query(
            r#"
            INSERT INTO transactions (
                id, user_id, account_id, transaction_type, amount, currency,
                description, date, is_recurring, recurrence_frequency,
                recurrence_end_date, parent_transaction_id, created_at,
                updated_at, deleted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE SET
                transaction_type = EXCLUDED.transaction_type,
                amount = EXCLUDED.amount,
                currency = EXCLUDED.currency,
                description = EXCLUDED.description,
                date = EXCLUDED.date,
                is_recurring = EXCLUDED.is_recurring,
                recurrence_frequency = EXCLUDED.recurrence_frequency,
                recurrence_end_date = EXCLUDED.recurrence_end_date,
                updated_at = EXCLUDED.updated_at,
                deleted_at = EXCLUDED.deleted_at
            "#,
        )
        .bind(state.id)
        .bind(state.user_id)
        .bind(state.account_id)
        .bind(state.transaction_type.as_str())
        .bind(state.amount.amount())
        .bind(state.amount.currency().code())
        .bind(&state.description)
        .bind(state.date)
        .bind(state.is_recurring)
        .bind(state.recurrence_frequency.map(|f| f.as_str()))
        .bind(state.recurrence_end_date)
        .bind(state.parent_transaction_id)
        .bind(state.created_at)
        .bind(state.updated_at)
        .bind(state.deleted_at);

        self.conn.execute(query).await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let query = sqlx::query(
            r#"
            UPDATE transactions
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id);

        Ok(self.conn.execute(query).await? > 0)
    }

    async fn find_active_recurring_transactions(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM transactions \
             WHERE is_recurring AND parent_transaction_id IS NULL AND deleted_at IS NULL \
               AND (recurrence_end_date IS NULL OR recurrence_end_date >= $1) \
             ORDER BY date, created_at, id",
            TRANSACTION_COLUMNS
        );
        let rows = self.conn.fetch_all(sqlx::query(&sql).bind(today)).await?;
        rows.iter().map(row_to_transaction).collect()
    }

    async fn find_by_parent_id_and_date(
        &self,
        parent_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Transaction>, RepositoryError> {
        self.fetch_one_where("parent_transaction_id = $1 AND date = $2", parent_id, Some(date))
            .await
    }

    async fn find_latest_by_parent_id(
        &self,
        parent_id: Uuid,
    ) -> Result<Option<Transaction>, RepositoryError> {
        self.fetch_one_where("parent_transaction_id = $1", parent_id, None)
            .await
    }
}

fn invalid_row(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::InvalidRow(e.to_string())
}
