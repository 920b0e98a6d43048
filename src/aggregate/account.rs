//! Account Aggregate
//!
//! Account holds a running balance that is moved incrementally by credits and
//! debits, never recomputed from the transaction history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::events::kinds;
use crate::domain::{DomainError, DomainEvent, GenericEvent, Money, TransactionType};

use super::Aggregate;

const MAX_NAME_LEN: usize = 100;

/// Kind of account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Checking,
    Savings,
    CreditCard,
    Investment,
    Cash,
    Other,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "CHECKING",
            AccountType::Savings => "SAVINGS",
            AccountType::CreditCard => "CREDIT_CARD",
            AccountType::Investment => "INVESTMENT",
            AccountType::Cash => "CASH",
            AccountType::Other => "OTHER",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CHECKING" => Ok(AccountType::Checking),
            "SAVINGS" => Ok(AccountType::Savings),
            "CREDIT_CARD" => Ok(AccountType::CreditCard),
            "INVESTMENT" => Ok(AccountType::Investment),
            "CASH" => Ok(AccountType::Cash),
            "OTHER" => Ok(AccountType::Other),
            other => Err(DomainError::InvalidAccount(format!("unknown account type '{}'", other))),
        }
    }
}

/// Whether the account belongs to personal or business finances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountContext {
    #[default]
    Personal,
    Business,
}

impl AccountContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountContext::Personal => "PERSONAL",
            AccountContext::Business => "BUSINESS",
        }
    }
}

impl FromStr for AccountContext {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PERSONAL" => Ok(AccountContext::Personal),
            "BUSINESS" => Ok(AccountContext::Business),
            other => Err(DomainError::InvalidAccount(format!("unknown context '{}'", other))),
        }
    }
}

/// Plain field set used to rebuild an Account from storage
#[derive(Debug, Clone)]
pub struct AccountState {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Money,
    pub context: AccountContext,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account Aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    id: Uuid,
    user_id: Uuid,
    name: String,
    account_type: AccountType,
    /// Single-currency running balance
    balance: Money,
    context: AccountContext,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Account {
    /// Open a new account and record `AccountCreated`
    pub fn open(
        user_id: Uuid,
        name: &str,
        account_type: AccountType,
        opening_balance: Money,
        context: AccountContext,
    ) -> Result<Self, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::InvalidAccount("name must not be empty".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::InvalidAccount(format!(
                "name exceeds {} characters",
                MAX_NAME_LEN
            )));
        }
        if opening_balance.is_negative() {
            return Err(DomainError::InvalidAmount(
                "opening balance must not be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let event = GenericEvent::new(kinds::ACCOUNT_CREATED, id, Self::aggregate_type())
            .with_data(serde_json::json!({
                "user_id": user_id,
                "account_type": account_type.as_str(),
                "currency": opening_balance.currency().code(),
            }));

        Ok(Self {
            id,
            user_id,
            name: name.to_string(),
            account_type,
            balance: opening_balance,
            context,
            is_active: true,
            created_at: now,
            updated_at: now,
            events: vec![event.into()],
        })
    }

    /// Rebuild an account from persisted state (no events raised)
    pub fn from_db_state(state: AccountState) -> Self {
        Self {
            id: state.id,
            user_id: state.user_id,
            name: state.name,
            account_type: state.account_type,
            balance: state.balance,
            context: state.context,
            is_active: state.is_active,
            created_at: state.created_at,
            updated_at: state.updated_at,
            events: Vec::new(),
        }
    }

    /// Plain field set for storage
    pub fn to_state(&self) -> AccountState {
        AccountState {
            id: self.id,
            user_id: self.user_id,
            name: self.name.clone(),
            account_type: self.account_type,
            balance: self.balance.clone(),
            context: self.context,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Add money to the balance
    pub fn credit(&mut self, amount: &Money) -> Result<(), DomainError> {
        Self::ensure_positive(amount)?;
        self.balance = self.balance.checked_add(amount)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Take money from the balance; the balance may not go below zero
    pub fn debit(&mut self, amount: &Money) -> Result<(), DomainError> {
        Self::ensure_positive(amount)?;
        let new_balance = self.balance.checked_sub(amount)?;
        if new_balance.is_negative() {
            return Err(DomainError::insufficient_balance(
                amount.amount(),
                self.balance.amount(),
            ));
        }
        self.balance = new_balance;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Apply a transaction's effect: income is credited, expense debited
    pub fn apply_transaction(
        &mut self,
        transaction_type: TransactionType,
        amount: &Money,
    ) -> Result<(), DomainError> {
        match transaction_type {
            TransactionType::Income => self.credit(amount),
            TransactionType::Expense => self.debit(amount),
        }
    }

    /// Undo a transaction's effect: income is debited back, expense credited back
    pub fn revert_transaction(
        &mut self,
        transaction_type: TransactionType,
        amount: &Money,
    ) -> Result<(), DomainError> {
        match transaction_type {
            TransactionType::Income => self.debit(amount),
            TransactionType::Expense => self.credit(amount),
        }
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.updated_at = Utc::now();
    }

    fn ensure_positive(amount: &Money) -> Result<(), DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::InvalidAmount(format!(
                "amount must be positive (got {})",
                amount
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    pub fn balance(&self) -> &Money {
        &self.balance
    }

    pub fn context(&self) -> AccountContext {
        self.context
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Account {}

impl Aggregate for Account {
    fn aggregate_type() -> &'static str {
        "Account"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn pending_events(&self) -> &[DomainEvent] {
        &self.events
    }

    fn drain_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Currency, Event};
    use rust_decimal_macros::dec;

    fn brl(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::new("BRL").unwrap())
    }

    fn checking(balance: rust_decimal::Decimal) -> Account {
        Account::open(
            Uuid::new_v4(),
            "Main checking",
            AccountType::Checking,
            brl(balance),
            AccountContext::Personal,
        )
        .unwrap()
    }

    #[test]
    fn test_account_open() {
        let user_id = Uuid::new_v4();
        let mut account = Account::open(
            user_id,
            "  Savings  ",
            AccountType::Savings,
            brl(dec!(1000.00)),
            AccountContext::Business,
        )
        .unwrap();

        assert_eq!(account.user_id(), user_id);
        assert_eq!(account.name(), "Savings");
        assert_eq!(account.balance().amount(), dec!(1000.00));
        assert!(account.is_active());

        let events = account.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_kind(), kinds::ACCOUNT_CREATED);
        assert_eq!(events[0].aggregate_id(), account.id());
        assert!(account.pending_events().is_empty());
    }

    #[test]
    fn test_account_open_validation() {
        let result = Account::open(
            Uuid::new_v4(),
            "   ",
            AccountType::Cash,
            brl(dec!(0)),
            AccountContext::Personal,
        );
        assert!(matches!(result, Err(DomainError::InvalidAccount(_))));

        let result = Account::open(
            Uuid::new_v4(),
            "Wallet",
            AccountType::Cash,
            brl(dec!(-1)),
            AccountContext::Personal,
        );
        assert!(matches!(result, Err(DomainError::InvalidAmount(_))));
    }

    #[test]
    fn test_account_credit_and_debit() {
        let mut account = checking(dec!(1000.00));

        account.credit(&brl(dec!(250.75))).unwrap();
        assert_eq!(account.balance().amount(), dec!(1250.75));

        account.debit(&brl(dec!(250.75))).unwrap();
        assert_eq!(account.balance().amount(), dec!(1000.00));
    }

    #[test]
    fn test_account_insufficient_balance() {
        let mut account = checking(dec!(50));

        let result = account.debit(&brl(dec!(100)));
        assert!(matches!(result, Err(DomainError::InsufficientBalance { .. })));
        assert_eq!(account.balance().amount(), dec!(50));
    }

    #[test]
    fn test_account_debit_to_exactly_zero() {
        let mut account = checking(dec!(50));
        account.debit(&brl(dec!(50))).unwrap();
        assert!(account.balance().is_zero());
    }

    #[test]
    fn test_account_rejects_other_currency() {
        let mut account = checking(dec!(100));
        let usd = Money::new(dec!(10), Currency::new("USD").unwrap());

        assert!(matches!(account.credit(&usd), Err(DomainError::CurrencyMismatch { .. })));
        assert!(matches!(account.debit(&usd), Err(DomainError::CurrencyMismatch { .. })));
        assert_eq!(account.balance().amount(), dec!(100));
    }

    #[test]
    fn test_account_rejects_non_positive_amounts() {
        let mut account = checking(dec!(100));
        assert!(matches!(account.credit(&brl(dec!(0))), Err(DomainError::InvalidAmount(_))));
        assert!(matches!(account.debit(&brl(dec!(-5))), Err(DomainError::InvalidAmount(_))));
    }

    #[test]
    fn test_apply_and_revert_transaction() {
        let mut account = checking(dec!(1000.00));

        account.apply_transaction(TransactionType::Income, &brl(dec!(100.00))).unwrap();
        assert_eq!(account.balance().amount(), dec!(1100.00));

        // Income 100 -> expense 200: revert old, apply new
        account.revert_transaction(TransactionType::Income, &brl(dec!(100.00))).unwrap();
        account.apply_transaction(TransactionType::Expense, &brl(dec!(200.00))).unwrap();
        assert_eq!(account.balance().amount(), dec!(800.00));

        account.revert_transaction(TransactionType::Expense, &brl(dec!(200.00))).unwrap();
        assert_eq!(account.balance().amount(), dec!(1000.00));
    }

    #[test]
    fn test_account_type_parse() {
        assert_eq!("credit_card".parse::<AccountType>().unwrap(), AccountType::CreditCard);
        assert!("brokerage".parse::<AccountType>().is_err());
    }
}
