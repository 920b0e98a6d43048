//! Domain module
//!
//! Core domain types and business logic.

pub mod error;
pub mod events;
pub mod money;
pub mod recurrence;
pub mod transaction_type;

pub use error::DomainError;
pub use events::{
    DomainEvent, Event, EventHeader, GenericEvent, TransactionCreated, TransactionDeleted,
    TransactionUpdated,
};
pub use money::{Currency, Money};
pub use recurrence::RecurrenceFrequency;
pub use transaction_type::TransactionType;
