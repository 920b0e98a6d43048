//! Repository Errors
//!
//! Error types for persistence and Unit of Work operations.

/// Errors that can occur in repositories and the Unit of Work
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// `begin()` called while a transaction is open
    #[error("Transaction already in progress")]
    TransactionAlreadyInProgress,

    /// `commit()`/`rollback()` called while idle
    #[error("No transaction in progress")]
    NoTransactionInProgress,

    /// A repository handle outlived the transaction it was bound to
    #[error("Transaction already closed")]
    TransactionClosed,

    /// Stored row could not be mapped back to an aggregate
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl RepositoryError {
    /// Check if this error comes from misuse of the Unit of Work state machine
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            RepositoryError::TransactionAlreadyInProgress
                | RepositoryError::NoTransactionInProgress
                | RepositoryError::TransactionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_errors() {
        assert!(RepositoryError::TransactionAlreadyInProgress.is_state_error());
        assert!(RepositoryError::NoTransactionInProgress.is_state_error());
        assert!(!RepositoryError::InvalidRow("bad currency".to_string()).is_state_error());
    }
}
