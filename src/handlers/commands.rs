//! Command definitions
//!
//! Commands represent intentions to change the system state. Identifiers,
//! amounts and enum values arrive as strings and are validated on execution.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Aggregate, NewTransaction, Recurrence, Transaction, TransactionChanges};
use crate::domain::{Currency, Money, RecurrenceFrequency, TransactionType};
use crate::error::AppError;

// =========================================================================
// CreateTransactionCommand
// =========================================================================

/// Command to record an income or expense (optionally a recurring template)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransactionCommand {
    pub user_id: String,
    pub account_id: String,
    /// "INCOME" or "EXPENSE" (case-insensitive)
    pub transaction_type: String,
    /// Decimal string, e.g. "250.75"
    pub amount: String,
    pub currency: String,
    pub description: String,
    pub date: NaiveDate,
    pub recurrence_frequency: Option<String>,
    pub recurrence_end_date: Option<NaiveDate>,
}

impl CreateTransactionCommand {
    pub fn new(
        user_id: impl Into<String>,
        account_id: impl Into<String>,
        transaction_type: impl Into<String>,
        amount: impl Into<String>,
        currency: impl Into<String>,
        description: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            account_id: account_id.into(),
            transaction_type: transaction_type.into(),
            amount: amount.into(),
            currency: currency.into(),
            description: description.into(),
            date,
            recurrence_frequency: None,
            recurrence_end_date: None,
        }
    }

    /// Make this a recurring template
    pub fn with_recurrence(
        mut self,
        frequency: impl Into<String>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        self.recurrence_frequency = Some(frequency.into());
        self.recurrence_end_date = end_date;
        self
    }

    /// Validate identifiers and values into aggregate input
    pub fn parse(&self) -> Result<NewTransaction, AppError> {
        let user_id = AppError::parse_id("user", &self.user_id)?;
        let account_id = AppError::parse_id("account", &self.account_id)?;
        let transaction_type: TransactionType = self.transaction_type.parse()?;
        let amount = Money::parse(&self.amount, &self.currency)?;

        let recurrence = match &self.recurrence_frequency {
            Some(frequency) => Some(Recurrence {
                frequency: frequency.parse::<RecurrenceFrequency>()?,
                end_date: self.recurrence_end_date,
            }),
            None if self.recurrence_end_date.is_some() => {
                return Err(AppError::Validation(
                    "recurrence end date given without a frequency".to_string(),
                ));
            }
            None => None,
        };

        Ok(NewTransaction {
            user_id,
            account_id,
            transaction_type,
            amount,
            description: self.description.clone(),
            date: self.date,
            recurrence,
        })
    }
}

// =========================================================================
// UpdateTransactionCommand
// =========================================================================

/// Command to change an existing transaction; `None` fields stay as they are
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTransactionCommand {
    pub transaction_id: String,
    pub transaction_type: Option<String>,
    /// New amount, in the transaction's existing currency
    pub amount: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
}

impl UpdateTransactionCommand {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, transaction_type: impl Into<String>) -> Self {
        self.transaction_type = Some(transaction_type.into());
        self
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn transaction_id(&self) -> Result<Uuid, AppError> {
        AppError::parse_id("transaction", &self.transaction_id)
    }

    /// Validate the changed values against the transaction being updated
    pub fn changes_for(&self, current: &Transaction) -> Result<TransactionChanges, AppError> {
        let transaction_type = self
            .transaction_type
            .as_deref()
            .map(str::parse::<TransactionType>)
            .transpose()?;
        let amount = self
            .amount
            .as_deref()
            .map(|amount| Money::parse(amount, current.amount().currency().code()))
            .transpose()?;

        let changes = TransactionChanges {
            transaction_type,
            amount,
            description: self.description.clone(),
            date: self.date,
        };
        if changes.is_empty() {
            return Err(AppError::Validation("no changes given".to_string()));
        }
        Ok(changes)
    }
}

// =========================================================================
// DeleteTransactionCommand
// =========================================================================

/// Command to soft-delete a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTransactionCommand {
    pub transaction_id: String,
}

impl DeleteTransactionCommand {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
        }
    }

    pub fn transaction_id(&self) -> Result<Uuid, AppError> {
        AppError::parse_id("transaction", &self.transaction_id)
    }
}

// =========================================================================
// Results
// =========================================================================

/// Outcome of a create/update/delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResult {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub currency: Currency,
    /// Account balance after the change; `None` when the balance is moved
    /// later by the balance projection
    pub account_balance: Option<Decimal>,
}

impl TransactionResult {
    pub(crate) fn from_transaction(transaction: &Transaction) -> Self {
        Self {
            transaction_id: transaction.id(),
            account_id: transaction.account_id(),
            transaction_type: transaction.transaction_type(),
            amount: transaction.amount().amount(),
            currency: transaction.amount().currency().clone(),
            account_balance: None,
        }
    }

    pub(crate) fn with_balance(mut self, balance: &Money) -> Self {
        self.account_balance = Some(balance.amount());
        self
    }
}
