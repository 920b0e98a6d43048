//! finance_ledger Library
//!
//! Ledger core: account balances kept consistent with transaction history,
//! an in-process event bus with retry, a Unit of Work over the account and
//! transaction repositories, and the recurring-transaction batch job.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod event_bus;
pub mod handlers;
pub mod jobs;
pub mod projection;
pub mod repository;

pub use config::Config;
pub use domain::{Currency, DomainError, DomainEvent, Money, RecurrenceFrequency, TransactionType};
pub use error::{AppError, AppResult};
pub use event_bus::{EventBus, EventHandler, PublishError, RetryConfig};
