//! Error handling module
//!
//! Centralized error type returned at the use-case boundary.

use uuid::Uuid;

use crate::domain::DomainError;
use crate::repository::RepositoryError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Caller errors
    #[error("Invalid {kind} id: {value}")]
    InvalidId { kind: &'static str, value: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    // Not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Infrastructure errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Parse a UUID, mapping failure to `InvalidId`
    pub fn parse_id(kind: &'static str, value: &str) -> Result<Uuid, AppError> {
        Uuid::parse_str(value.trim()).map_err(|_| AppError::InvalidId {
            kind,
            value: value.to_string(),
        })
    }

    /// Check if the error means a referenced entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::TransactionNotFound(_) | AppError::AccountNotFound(_)
        )
    }

    /// Check if the error is a terminal problem with the caller's input
    pub fn is_validation(&self) -> bool {
        match self {
            AppError::InvalidId { .. } | AppError::Validation(_) => true,
            AppError::Domain(e) => e.is_validation_error(),
            _ => false,
        }
    }
}
