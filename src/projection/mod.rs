//! Projection module
//!
//! Event subscribers that derive state from published events. The balance
//! projection is the eventual path for moving account balances.

mod balance;

pub use balance::{BalanceProjection, HANDLER_NAME as BALANCE_PROJECTION};
