//! Command Handlers module
//!
//! Use cases that change transactions. The atomic handlers move the account
//! balance inside a Unit of Work; [`TransactionRecorder`] writes only the
//! transaction and leaves the balance to the event subscribers.

mod commands;
mod create_transaction_handler;
mod delete_transaction_handler;
pub(crate) mod dispatch;
mod recorder;
mod update_transaction_handler;


pub use commands::*;
pub use create_transaction_handler::CreateTransactionHandler;
pub use delete_transaction_handler::DeleteTransactionHandler;
pub use recorder::TransactionRecorder;
pub use update_transaction_handler::UpdateTransactionHandler;
