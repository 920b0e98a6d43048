//! End-to-end ledger flows over the in-memory adapters
//!
//! Exercises the public surface the way the binary wires it: one event bus,
//! the balance projection subscribed with retry, atomic handlers for user
//! writes and the recurring processor for materialized instances.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use uuid::Uuid;

use finance_ledger::aggregate::{
    Account, AccountContext, AccountType, Aggregate, NewTransaction, Recurrence, Transaction,
};
use finance_ledger::domain::events::kinds;
use finance_ledger::event_bus::handler_fn;
use finance_ledger::handlers::{
    CreateTransactionCommand, CreateTransactionHandler, DeleteTransactionCommand,
    DeleteTransactionHandler,
};
use finance_ledger::jobs::RecurringTransactionProcessor;
use finance_ledger::projection::{BalanceProjection, BALANCE_PROJECTION};
use finance_ledger::repository::{InMemoryStore, TransactionRepository};
use finance_ledger::{EventBus, RecurrenceFrequency, RetryConfig, TransactionType};

mod common;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
    }
}

#[tokio::test]
async fn test_atomic_writes_and_recurring_batch_share_one_bus() {
    let store = InMemoryStore::new();
    let accounts = store.account_repository();
    let account = common::seed_account(&accounts, dec!(1000.00)).await;

    let bus = Arc::new(EventBus::new());
    Arc::new(BalanceProjection::new(store.account_repository())).register(&bus, Some(fast_retry()));

    // User-issued recurring income: template applied atomically, once
    let mut create = CreateTransactionHandler::new(Box::new(store.unit_of_work()), bus.clone());
    let template = create
        .execute(
            CreateTransactionCommand::new(
                account.user_id().to_string(),
                account.id().to_string(),
                "INCOME",
                "300.00",
                "BRL",
                "Rent received",
                date("2026-09-16"),
            )
            .with_recurrence("MONTHLY", None),
        )
        .await
        .unwrap();
    assert_eq!(common::balance_of(&accounts, &account).await, dec!(1300.00));

    // Batch materializes October's occurrence; the projection applies it
    let processor = RecurringTransactionProcessor::new(store.transaction_repository(), bus.clone());
    let report = processor.run(date("2026-10-16")).await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(common::balance_of(&accounts, &account).await, dec!(1600.00));

    // Same day again: idempotent
    assert_eq!(processor.run(date("2026-10-16")).await.unwrap().created, 0);
    assert_eq!(common::balance_of(&accounts, &account).await, dec!(1600.00));

    let instance = store
        .transaction_repository()
        .find_by_parent_id_and_date(template.transaction_id, date("2026-10-16"))
        .await
        .unwrap()
        .expect("instance materialized");
    assert!(instance.is_instance());

    // Deleting the instance through the atomic path reverts exactly once
    let mut delete = DeleteTransactionHandler::new(Box::new(store.unit_of_work()), bus);
    delete
        .execute(DeleteTransactionCommand::new(instance.id().to_string()))
        .await
        .unwrap();
    assert_eq!(common::balance_of(&accounts, &account).await, dec!(1300.00));
}

#[tokio::test]
async fn test_projection_failure_is_retried_then_reported() {
    let store = InMemoryStore::new();
    let bus = Arc::new(EventBus::new());
    Arc::new(BalanceProjection::new(store.account_repository())).register(&bus, Some(fast_retry()));

    let exhausted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&exhausted);
    bus.set_error_callback(move |kind, handler, _error| {
        sink.lock().unwrap().push((kind.to_string(), handler.to_string()));
    });

    // Template on an account that was never saved: every projection attempt fails
    let ghost = Account::open(
        Uuid::new_v4(),
        "Ghost",
        AccountType::Cash,
        common::brl(dec!(0.00)),
        AccountContext::Personal,
    )
    .unwrap();
    let template = Transaction::create(
        NewTransaction {
            user_id: ghost.user_id(),
            account_id: ghost.id(),
            transaction_type: TransactionType::Expense,
            amount: common::brl(dec!(10.00)),
            description: "Gym".to_string(),
            date: date("2026-10-15"),
            recurrence: Some(Recurrence {
                frequency: RecurrenceFrequency::Daily,
                end_date: None,
            }),
        },
    )
    .unwrap();
    store.transaction_repository().save(&template).await.unwrap();

    let processor = RecurringTransactionProcessor::new(store.transaction_repository(), bus);
    let report = processor.run(date("2026-10-16")).await.unwrap();

    // The instance is still written; only the balance update failed
    assert_eq!(report.created, 1);
    assert_eq!(
        *exhausted.lock().unwrap(),
        vec![(kinds::TRANSACTION_CREATED.to_string(), BALANCE_PROJECTION.to_string())]
    );
}

#[tokio::test]
async fn test_publish_async_runs_every_subscriber() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let calls = Arc::clone(&calls);
        bus.subscribe(
            kinds::ACCOUNT_CREATED,
            handler_fn(move |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                }
            }),
        );
    }

    let mut account = Account::open(
        Uuid::new_v4(),
        "Savings",
        AccountType::Savings,
        common::brl(dec!(0.00)),
        AccountContext::Business,
    )
    .unwrap();
    let event = account.drain_events().remove(0);

    tokio_test::assert_ok!(bus.publish_async(&event).await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
