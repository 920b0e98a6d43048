//! Repository module
//!
//! Persistence ports for accounts and transactions, the Unit of Work that
//! spans them, and the in-memory and PostgreSQL adapters.

mod error;
mod memory;
mod ports;
mod postgres;

pub use error::RepositoryError;
pub use memory::{
    InMemoryAccountRepository, InMemoryStore, InMemoryTransactionRepository, InMemoryUnitOfWork,
};
pub use ports::{AccountRepository, TransactionRepository, UnitOfWork};
pub use postgres::{PgAccountRepository, PgTransactionRepository, PgUnitOfWork};
