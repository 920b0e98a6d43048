//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use finance_ledger::aggregate::{Account, AccountContext, AccountType, Aggregate};
use finance_ledger::db;
use finance_ledger::repository::AccountRepository;
use finance_ledger::{Currency, Money};

/// Setup test database - apply the schema and truncate ledger tables
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = db::connect(&database_url, 5)
        .await
        .expect("Failed to connect to DB");
    db::run_migrations(&pool)
        .await
        .expect("Failed to apply migrations");

    // Clean up DB for fresh state
    sqlx::query("TRUNCATE TABLE transactions, accounts CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    pool
}

pub fn brl(amount: Decimal) -> Money {
    Money::new(amount, Currency::new("BRL").unwrap())
}

/// Open and persist a BRL checking account for a fresh user
pub async fn seed_account(accounts: &Arc<dyn AccountRepository>, balance: Decimal) -> Account {
    let account = Account::open(
        Uuid::new_v4(),
        "Integration checking",
        AccountType::Checking,
        brl(balance),
        AccountContext::Personal,
    )
    .unwrap();
    accounts.save(&account).await.unwrap();
    account
}

pub async fn balance_of(accounts: &Arc<dyn AccountRepository>, account: &Account) -> Decimal {
    accounts
        .find_by_id(account.id())
        .await
        .unwrap()
        .expect("account exists")
        .balance()
        .amount()
}
