//! Domain Events
//!
//! Immutable facts raised by aggregates. Every concrete event holds an
//! [`EventHeader`] and exposes the common accessors through the [`Event`]
//! trait, which delegates to that header.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Currency, Money, TransactionType};

/// Schema version stamped on every event produced by this crate
pub const SCHEMA_VERSION: u32 = 1;

/// Event kind tags used as event bus routing keys
pub mod kinds {
    pub const TRANSACTION_CREATED: &str = "TransactionCreated";
    pub const TRANSACTION_UPDATED: &str = "TransactionUpdated";
    pub const TRANSACTION_DELETED: &str = "TransactionDeleted";
    pub const ACCOUNT_CREATED: &str = "AccountCreated";
}

/// Fields shared by every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    event_id: Uuid,
    event_kind: String,
    aggregate_id: Uuid,
    aggregate_type: String,
    occurred_at: DateTime<Utc>,
    version: u32,
}

impl EventHeader {
    pub fn new(event_kind: &str, aggregate_id: Uuid, aggregate_type: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_kind: event_kind.to_string(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            occurred_at: Utc::now(),
            version: SCHEMA_VERSION,
        }
    }
}

/// Common accessors, all answered by the event's header
pub trait Event {
    fn header(&self) -> &EventHeader;

    fn event_id(&self) -> Uuid {
        self.header().event_id
    }

    fn event_kind(&self) -> &str {
        &self.header().event_kind
    }

    fn aggregate_id(&self) -> Uuid {
        self.header().aggregate_id
    }

    fn aggregate_type(&self) -> &str {
        &self.header().aggregate_type
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.header().occurred_at
    }

    fn version(&self) -> u32 {
        self.header().version
    }
}

/// A transaction was recorded against an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCreated {
    header: EventHeader,
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    /// Amount in minor units
    pub amount: i64,
    pub currency: Currency,
    /// Set when the publisher already moved the account balance
    pub balance_applied: bool,
}

impl TransactionCreated {
    pub fn new(
        transaction_id: Uuid,
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: &Money,
    ) -> Self {
        Self {
            header: EventHeader::new(kinds::TRANSACTION_CREATED, transaction_id, "Transaction"),
            account_id,
            transaction_type,
            amount: amount.minor_units(),
            currency: amount.currency().clone(),
            balance_applied: false,
        }
    }

    pub fn money(&self) -> Money {
        Money::from_minor_units(self.amount, self.currency.clone())
    }
}

impl Event for TransactionCreated {
    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// A transaction's type and/or amount changed; carries both sides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionUpdated {
    header: EventHeader,
    pub account_id: Uuid,
    pub old_type: TransactionType,
    pub old_amount: i64,
    pub new_type: TransactionType,
    pub new_amount: i64,
    pub currency: Currency,
    pub balance_applied: bool,
}

impl TransactionUpdated {
    pub fn new(
        transaction_id: Uuid,
        account_id: Uuid,
        old_type: TransactionType,
        old_amount: &Money,
        new_type: TransactionType,
        new_amount: &Money,
    ) -> Self {
        Self {
            header: EventHeader::new(kinds::TRANSACTION_UPDATED, transaction_id, "Transaction"),
            account_id,
            old_type,
            old_amount: old_amount.minor_units(),
            new_type,
            new_amount: new_amount.minor_units(),
            currency: new_amount.currency().clone(),
            balance_applied: false,
        }
    }

    pub fn old_money(&self) -> Money {
        Money::from_minor_units(self.old_amount, self.currency.clone())
    }

    pub fn new_money(&self) -> Money {
        Money::from_minor_units(self.new_amount, self.currency.clone())
    }
}

impl Event for TransactionUpdated {
    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// A transaction was soft-deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDeleted {
    header: EventHeader,
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub currency: Currency,
    pub balance_applied: bool,
}

impl TransactionDeleted {
    pub fn new(
        transaction_id: Uuid,
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: &Money,
    ) -> Self {
        Self {
            header: EventHeader::new(kinds::TRANSACTION_DELETED, transaction_id, "Transaction"),
            account_id,
            transaction_type,
            amount: amount.minor_units(),
            currency: amount.currency().clone(),
            balance_applied: false,
        }
    }

    pub fn money(&self) -> Money {
        Money::from_minor_units(self.amount, self.currency.clone())
    }
}

impl Event for TransactionDeleted {
    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// Kind/aggregate-only event for simpler aggregates (accounts, budgets, categories)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericEvent {
    header: EventHeader,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl GenericEvent {
    pub fn new(event_kind: &str, aggregate_id: Uuid, aggregate_type: &str) -> Self {
        Self {
            header: EventHeader::new(event_kind, aggregate_id, aggregate_type),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

impl Event for GenericEvent {
    fn header(&self) -> &EventHeader {
        &self.header
    }
}

/// Every event an aggregate in this crate can raise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    TransactionCreated(TransactionCreated),
    TransactionUpdated(TransactionUpdated),
    TransactionDeleted(TransactionDeleted),
    Generic(GenericEvent),
}

impl DomainEvent {
    /// Account whose balance this event affects, if any
    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            DomainEvent::TransactionCreated(e) => Some(e.account_id),
            DomainEvent::TransactionUpdated(e) => Some(e.account_id),
            DomainEvent::TransactionDeleted(e) => Some(e.account_id),
            DomainEvent::Generic(_) => None,
        }
    }

    /// Whether the balance effect was already applied by the publisher.
    /// Always false for generic events.
    pub fn balance_applied(&self) -> bool {
        match self {
            DomainEvent::TransactionCreated(e) => e.balance_applied,
            DomainEvent::TransactionUpdated(e) => e.balance_applied,
            DomainEvent::TransactionDeleted(e) => e.balance_applied,
            DomainEvent::Generic(_) => false,
        }
    }

    /// Flag the event as already reflected in the account balance
    pub fn mark_balance_applied(&mut self) {
        match self {
            DomainEvent::TransactionCreated(e) => e.balance_applied = true,
            DomainEvent::TransactionUpdated(e) => e.balance_applied = true,
            DomainEvent::TransactionDeleted(e) => e.balance_applied = true,
            DomainEvent::Generic(_) => {}
        }
    }
}

impl Event for DomainEvent {
    fn header(&self) -> &EventHeader {
        match self {
            DomainEvent::TransactionCreated(e) => e.header(),
            DomainEvent::TransactionUpdated(e) => e.header(),
            DomainEvent::TransactionDeleted(e) => e.header(),
            DomainEvent::Generic(e) => e.header(),
        }
    }
}

impl From<TransactionCreated> for DomainEvent {
    fn from(event: TransactionCreated) -> Self {
        DomainEvent::TransactionCreated(event)
    }
}

impl From<TransactionUpdated> for DomainEvent {
    fn from(event: TransactionUpdated) -> Self {
        DomainEvent::TransactionUpdated(event)
    }
}

impl From<TransactionDeleted> for DomainEvent {
    fn from(event: TransactionDeleted) -> Self {
        DomainEvent::TransactionDeleted(event)
    }
}

impl From<GenericEvent> for DomainEvent {
    fn from(event: GenericEvent) -> Self {
        DomainEvent::Generic(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn brl(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::new("BRL").unwrap())
    }

    #[test]
    fn test_header_accessors_delegate() {
        let tx_id = Uuid::new_v4();
        let event: DomainEvent =
            TransactionCreated::new(tx_id, Uuid::new_v4(), TransactionType::Income, &brl(dec!(250.75)))
                .into();

        assert_eq!(event.event_kind(), kinds::TRANSACTION_CREATED);
        assert_eq!(event.aggregate_id(), tx_id);
        assert_eq!(event.aggregate_type(), "Transaction");
        assert_eq!(event.version(), SCHEMA_VERSION);
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = GenericEvent::new(kinds::ACCOUNT_CREATED, Uuid::new_v4(), "Account");
        let b = GenericEvent::new(kinds::ACCOUNT_CREATED, Uuid::new_v4(), "Account");
        assert_ne!(a.event_id(), b.event_id());
    }

    #[test]
    fn test_amounts_travel_in_minor_units() {
        let event = TransactionUpdated::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            TransactionType::Income,
            &brl(dec!(100.00)),
            TransactionType::Expense,
            &brl(dec!(200.00)),
        );

        assert_eq!(event.old_amount, 10_000);
        assert_eq!(event.new_amount, 20_000);
        assert_eq!(event.old_money().amount(), dec!(100.00));
        assert_eq!(event.new_money().currency().code(), "BRL");
    }

    #[test]
    fn test_mark_balance_applied() {
        let mut event: DomainEvent =
            TransactionDeleted::new(Uuid::new_v4(), Uuid::new_v4(), TransactionType::Expense, &brl(dec!(5)))
                .into();
        assert!(!event.balance_applied());

        event.mark_balance_applied();
        assert!(event.balance_applied());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event: DomainEvent = GenericEvent::new("BudgetCreated", Uuid::new_v4(), "Budget")
            .with_data(serde_json::json!({ "limit": 500 }))
            .into();

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"Generic""#));

        let back: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
