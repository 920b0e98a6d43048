//! Aggregate module
//!
//! Consistency boundaries. Each aggregate enforces its own invariants and
//! buffers the events its mutations raise until a use case drains them.

pub mod account;
pub mod transaction;

pub use account::{Account, AccountContext, AccountState, AccountType};
pub use transaction::{
    NewTransaction, Recurrence, Transaction, TransactionChanges, TransactionState,
};

use crate::domain::DomainEvent;

/// Aggregate trait that all aggregates must implement
pub trait Aggregate: Sized {
    /// Get the aggregate type name (for events and storage)
    fn aggregate_type() -> &'static str;

    /// Get the aggregate ID
    fn id(&self) -> uuid::Uuid;

    /// Events raised since the last drain, oldest first
    fn pending_events(&self) -> &[DomainEvent];

    /// Hand over the buffered events and clear the buffer
    fn drain_events(&mut self) -> Vec<DomainEvent>;
}
