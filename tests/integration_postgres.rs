//! Integration tests for the PostgreSQL adapters
//!
//! Require a reachable database: `DATABASE_URL=... cargo test -- --ignored`

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use uuid::Uuid;

use finance_ledger::aggregate::{Aggregate, NewTransaction, Recurrence, Transaction};
use finance_ledger::db;
use finance_ledger::handlers::{
    CreateTransactionCommand, CreateTransactionHandler, UpdateTransactionCommand,
    UpdateTransactionHandler,
};
use finance_ledger::jobs::RecurringTransactionProcessor;
use finance_ledger::projection::BalanceProjection;
use finance_ledger::repository::{
    AccountRepository, PgAccountRepository, PgTransactionRepository, PgUnitOfWork,
    RepositoryError, TransactionRepository, UnitOfWork,
};
use finance_ledger::{AppError, EventBus, RecurrenceFrequency, TransactionType};

mod common;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_schema_is_present_after_migrations() {
    let pool = common::setup_test_db().await;
    assert!(db::check_schema(&pool).await.unwrap());
    // Re-running is harmless
    db::run_migrations(&pool).await.unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_unit_of_work_commit_and_rollback() {
    let pool = common::setup_test_db().await;
    let accounts: Arc<dyn AccountRepository> = Arc::new(PgAccountRepository::new(pool.clone()));
    let account = common::seed_account(&accounts, dec!(100.00)).await;

    let mut uow = PgUnitOfWork::new(pool.clone());
    assert!(!uow.is_in_transaction());
    assert!(matches!(
        uow.commit().await,
        Err(RepositoryError::NoTransactionInProgress)
    ));

    // Rolled back credit is invisible
    uow.begin().await.unwrap();
    assert!(matches!(
        uow.begin().await,
        Err(RepositoryError::TransactionAlreadyInProgress)
    ));
    let tx_accounts = uow.account_repository();
    let mut loaded = tx_accounts.find_by_id(account.id()).await.unwrap().unwrap();
    loaded.credit(&common::brl(dec!(50.00))).unwrap();
    tx_accounts.save(&loaded).await.unwrap();
    uow.rollback().await.unwrap();
    assert_eq!(common::balance_of(&accounts, &account).await, dec!(100.00));

    // A handle kept past the boundary refuses to run
    assert!(matches!(
        tx_accounts.find_by_id(account.id()).await,
        Err(RepositoryError::TransactionClosed)
    ));

    // Committed credit is visible
    uow.begin().await.unwrap();
    let tx_accounts = uow.account_repository();
    let mut loaded = tx_accounts.find_by_id(account.id()).await.unwrap().unwrap();
    loaded.credit(&common::brl(dec!(50.00))).unwrap();
    tx_accounts.save(&loaded).await.unwrap();
    uow.commit().await.unwrap();
    assert!(!uow.is_in_transaction());
    assert_eq!(common::balance_of(&accounts, &account).await, dec!(150.00));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_atomic_handlers_against_postgres() {
    let pool = common::setup_test_db().await;
    let accounts: Arc<dyn AccountRepository> = Arc::new(PgAccountRepository::new(pool.clone()));
    let account = common::seed_account(&accounts, dec!(1000.00)).await;
    let bus = Arc::new(EventBus::new());

    let mut create = CreateTransactionHandler::new(Box::new(PgUnitOfWork::new(pool.clone())), bus.clone());
    let created = create
        .execute(CreateTransactionCommand::new(
            account.user_id().to_string(),
            account.id().to_string(),
            "INCOME",
            "100.00",
            "BRL",
            "Consulting",
            date("2026-10-16"),
        ))
        .await
        .unwrap();
    assert_eq!(common::balance_of(&accounts, &account).await, dec!(1100.00));

    let mut update = UpdateTransactionHandler::new(Box::new(PgUnitOfWork::new(pool.clone())), bus.clone());
    update
        .execute(
            UpdateTransactionCommand::new(created.transaction_id.to_string())
                .with_type("EXPENSE")
                .with_amount("200.00"),
        )
        .await
        .unwrap();
    assert_eq!(common::balance_of(&accounts, &account).await, dec!(800.00));

    // Expense larger than the balance: nothing changes
    let err = update
        .execute(UpdateTransactionCommand::new(created.transaction_id.to_string()).with_amount("5000.00"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Domain(_)));
    assert_eq!(common::balance_of(&accounts, &account).await, dec!(800.00));

    let transactions = PgTransactionRepository::new(pool.clone());
    let stored = transactions
        .find_by_id(created.transaction_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.amount().amount(), dec!(200.00));
    assert_eq!(stored.transaction_type(), TransactionType::Expense);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_creates_on_one_account_both_apply() {
    let pool = common::setup_test_db().await;
    let accounts: Arc<dyn AccountRepository> = Arc::new(PgAccountRepository::new(pool.clone()));
    let account = common::seed_account(&accounts, dec!(1000.00)).await;
    let bus = Arc::new(EventBus::new());

    let command = |amount: &str| {
        CreateTransactionCommand::new(
            account.user_id().to_string(),
            account.id().to_string(),
            "INCOME",
            amount,
            "BRL",
            "Consulting",
            date("2026-10-16"),
        )
    };
    let mut first = CreateTransactionHandler::new(Box::new(PgUnitOfWork::new(pool.clone())), bus.clone());
    let mut second = CreateTransactionHandler::new(Box::new(PgUnitOfWork::new(pool.clone())), bus.clone());

    let (a, b) = tokio::join!(
        first.execute(command("250.00")),
        second.execute(command("100.00"))
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(common::balance_of(&accounts, &account).await, dec!(1350.00));
    let transactions = PgTransactionRepository::new(pool.clone());
    assert_eq!(transactions.find_by_user_id(account.user_id()).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_recurring_batch_against_postgres() {
    let pool = common::setup_test_db().await;
    let accounts: Arc<dyn AccountRepository> = Arc::new(PgAccountRepository::new(pool.clone()));
    let transactions: Arc<dyn TransactionRepository> =
        Arc::new(PgTransactionRepository::new(pool.clone()));
    let account = common::seed_account(&accounts, dec!(500.00)).await;

    let template = Transaction::create(NewTransaction {
        user_id: account.user_id(),
        account_id: account.id(),
        transaction_type: TransactionType::Expense,
        amount: common::brl(dec!(120.00)),
        description: "Internet".to_string(),
        date: date("2026-08-16"),
        recurrence: Some(Recurrence {
            frequency: RecurrenceFrequency::Monthly,
            end_date: Some(date("2027-08-16")),
        }),
    })
    .unwrap();
    transactions.save(&template).await.unwrap();

    let bus = Arc::new(EventBus::new());
    Arc::new(BalanceProjection::new(Arc::clone(&accounts))).register(&bus, None);
    let processor = RecurringTransactionProcessor::new(Arc::clone(&transactions), bus);

    let today = date("2026-10-16");
    assert_eq!(processor.run(today).await.unwrap().created, 1);
    assert_eq!(processor.run(today).await.unwrap().created, 1);
    assert_eq!(processor.run(today).await.unwrap().created, 0);

    let latest = transactions
        .find_latest_by_parent_id(template.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.date(), today);
    assert!(transactions
        .find_by_parent_id_and_date(template.id(), date("2026-09-16"))
        .await
        .unwrap()
        .is_some());
    assert!(transactions
        .find_by_parent_id_and_date(Uuid::new_v4(), today)
        .await
        .unwrap()
        .is_none());

    // Two instances of 120.00 applied by the projection
    assert_eq!(common::balance_of(&accounts, &account).await, dec!(260.00));
}
