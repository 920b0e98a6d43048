//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

/// Domain-specific errors
///
/// These errors represent business rule violations and domain invariant failures.
/// None of them is retryable: the same input fails the same way.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Debit would take the balance below zero
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    /// Money of two different currencies was combined
    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },

    /// Invalid amount (zero, negative, too precise, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("Invalid transaction type: {0}")]
    InvalidTransactionType(String),

    #[error("Invalid description: {0}")]
    InvalidDescription(String),

    /// Recurrence fields violate the template/instance rules
    #[error("Invalid recurrence: {0}")]
    InvalidRecurrence(String),

    #[error("Invalid account: {0}")]
    InvalidAccount(String),

    /// Business rule violation
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),
}

impl DomainError {
    /// Create an insufficient balance error
    pub fn insufficient_balance(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance { required, available }
    }

    /// Check if this is a validation failure on the caller's input
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::CurrencyMismatch { .. }
                | Self::InvalidAmount(_)
                | Self::InvalidCurrency(_)
                | Self::InvalidTransactionType(_)
                | Self::InvalidDescription(_)
                | Self::InvalidRecurrence(_)
                | Self::InvalidAccount(_)
        )
    }
}
