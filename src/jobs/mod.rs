//! Batch Jobs
//!
//! Single-shot jobs meant to be triggered by an external scheduler.

mod recurring;

pub use recurring::{RecurringRunReport, RecurringTransactionProcessor};
