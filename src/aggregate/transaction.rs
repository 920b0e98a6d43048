//! Transaction Aggregate
//!
//! A single income or expense against one account. A transaction may also be
//! a recurring *template* (`is_recurring`, no parent) or a *materialized
//! instance* of a template (not recurring, parent set).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    DomainError, DomainEvent, Money, RecurrenceFrequency, TransactionCreated, TransactionDeleted,
    TransactionType, TransactionUpdated,
};

use super::Aggregate;

/// Maximum transaction amount in major units
const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Maximum decimal places of a transaction amount
const MAX_SCALE: u32 = 2;

const MAX_DESCRIPTION_LEN: usize = 255;

/// Recurrence settings of a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: RecurrenceFrequency,
    pub end_date: Option<NaiveDate>,
}

/// Input for [`Transaction::create`]
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub description: String,
    pub date: NaiveDate,
    pub recurrence: Option<Recurrence>,
}

/// Partial update; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct TransactionChanges {
    pub transaction_type: Option<TransactionType>,
    pub amount: Option<Money>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
}

impl TransactionChanges {
    pub fn is_empty(&self) -> bool {
        self.transaction_type.is_none()
            && self.amount.is_none()
            && self.description.is_none()
            && self.date.is_none()
    }
}

/// Plain field set used to rebuild a Transaction from storage
#[derive(Debug, Clone)]
pub struct TransactionState {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub description: String,
    pub date: NaiveDate,
    pub is_recurring: bool,
    pub recurrence_frequency: Option<RecurrenceFrequency>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub parent_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Transaction Aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    id: Uuid,
    user_id: Uuid,
    account_id: Uuid,
    transaction_type: TransactionType,
    /// Always strictly positive; the type carries the sign
    amount: Money,
    description: String,
    /// Calendar date; time of day is irrelevant
    date: NaiveDate,
    is_recurring: bool,
    recurrence_frequency: Option<RecurrenceFrequency>,
    recurrence_end_date: Option<NaiveDate>,
    parent_transaction_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Transaction {
    /// Validate input, build the transaction and record `TransactionCreated`
    pub fn create(new: NewTransaction) -> Result<Self, DomainError> {
        let (is_recurring, frequency, end_date) = match new.recurrence {
            Some(r) => (true, Some(r.frequency), r.end_date),
            None => (false, None, None),
        };
        Self::build(
            new.user_id,
            new.account_id,
            new.transaction_type,
            new.amount,
            &new.description,
            new.date,
            is_recurring,
            frequency,
            end_date,
            None,
        )
    }

    /// Produce the occurrence of this template due on `date`.
    ///
    /// Copies user, account, type, amount and description; the instance is
    /// not recurring and points back at this template.
    pub fn materialize(&self, date: NaiveDate) -> Result<Self, DomainError> {
        if !self.is_template() {
            return Err(DomainError::BusinessRuleViolation(format!(
                "transaction {} is not a recurring template",
                self.id
            )));
        }
        Self::build(
            self.user_id,
            self.account_id,
            self.transaction_type,
            self.amount.clone(),
            &self.description,
            date,
            false,
            None,
            None,
            Some(self.id),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        user_id: Uuid,
        account_id: Uuid,
        transaction_type: TransactionType,
        amount: Money,
        description: &str,
        date: NaiveDate,
        is_recurring: bool,
        recurrence_frequency: Option<RecurrenceFrequency>,
        recurrence_end_date: Option<NaiveDate>,
        parent_transaction_id: Option<Uuid>,
    ) -> Result<Self, DomainError> {
        validate_amount(&amount)?;
        let description = normalize_description(description)?;
        validate_recurrence(
            is_recurring,
            recurrence_frequency,
            recurrence_end_date,
            parent_transaction_id,
            date,
        )?;

        let now = Utc::now();
        let id = Uuid::new_v4();
        let event = TransactionCreated::new(id, account_id, transaction_type, &amount);

        Ok(Self {
            id,
            user_id,
            account_id,
            transaction_type,
            amount,
            description,
            date,
            is_recurring,
            recurrence_frequency,
            recurrence_end_date,
            parent_transaction_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            events: vec![event.into()],
        })
    }

    /// Rebuild a transaction from persisted state (no validation, no events)
    pub fn from_db_state(state: TransactionState) -> Self {
        Self {
            id: state.id,
            user_id: state.user_id,
            account_id: state.account_id,
            transaction_type: state.transaction_type,
            amount: state.amount,
            description: state.description,
            date: state.date,
            is_recurring: state.is_recurring,
            recurrence_frequency: state.recurrence_frequency,
            recurrence_end_date: state.recurrence_end_date,
            parent_transaction_id: state.parent_transaction_id,
            created_at: state.created_at,
            updated_at: state.updated_at,
            deleted_at: state.deleted_at,
            events: Vec::new(),
        }
    }

    /// Plain field set for storage
    pub fn to_state(&self) -> TransactionState {
        TransactionState {
            id: self.id,
            user_id: self.user_id,
            account_id: self.account_id,
            transaction_type: self.transaction_type,
            amount: self.amount.clone(),
            description: self.description.clone(),
            date: self.date,
            is_recurring: self.is_recurring,
            recurrence_frequency: self.recurrence_frequency,
            recurrence_end_date: self.recurrence_end_date,
            parent_transaction_id: self.parent_transaction_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }

    /// Apply changes in place and record `TransactionUpdated`.
    ///
    /// All changes are validated before any field is touched. The entity keeps
    /// no history, so callers that need the old type/amount must read them
    /// before calling this.
    pub fn update(&mut self, changes: TransactionChanges) -> Result<(), DomainError> {
        self.ensure_not_deleted()?;

        let new_type = changes.transaction_type.unwrap_or(self.transaction_type);
        let new_amount = match changes.amount {
            Some(amount) => {
                validate_amount(&amount)?;
                if !amount.same_currency(&self.amount) {
                    return Err(DomainError::CurrencyMismatch {
                        expected: self.amount.currency().to_string(),
                        found: amount.currency().to_string(),
                    });
                }
                amount
            }
            None => self.amount.clone(),
        };
        let new_description = match changes.description {
            Some(d) => normalize_description(&d)?,
            None => self.description.clone(),
        };
        let new_date = changes.date.unwrap_or(self.date);
        validate_recurrence(
            self.is_recurring,
            self.recurrence_frequency,
            self.recurrence_end_date,
            self.parent_transaction_id,
            new_date,
        )?;

        let event = TransactionUpdated::new(
            self.id,
            self.account_id,
            self.transaction_type,
            &self.amount,
            new_type,
            &new_amount,
        );

        self.transaction_type = new_type;
        self.amount = new_amount;
        self.description = new_description;
        self.date = new_date;
        self.updated_at = Utc::now();
        self.events.push(event.into());
        Ok(())
    }

    /// Soft-delete and record `TransactionDeleted`
    pub fn mark_deleted(&mut self) -> Result<(), DomainError> {
        self.ensure_not_deleted()?;
        let now = Utc::now();
        self.deleted_at = Some(now);
        self.updated_at = now;
        self.events.push(
            TransactionDeleted::new(self.id, self.account_id, self.transaction_type, &self.amount)
                .into(),
        );
        Ok(())
    }

    fn ensure_not_deleted(&self) -> Result<(), DomainError> {
        if self.is_deleted() {
            return Err(DomainError::BusinessRuleViolation(format!(
                "transaction {} is deleted",
                self.id
            )));
        }
        Ok(())
    }

    /// Recurring template: recurring and not derived from another template
    pub fn is_template(&self) -> bool {
        self.is_recurring && self.parent_transaction_id.is_none()
    }

    /// Materialized occurrence of a template
    pub fn is_instance(&self) -> bool {
        !self.is_recurring && self.parent_transaction_id.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn amount(&self) -> &Money {
        &self.amount
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn is_recurring(&self) -> bool {
        self.is_recurring
    }

    pub fn recurrence_frequency(&self) -> Option<RecurrenceFrequency> {
        self.recurrence_frequency
    }

    pub fn recurrence_end_date(&self) -> Option<NaiveDate> {
        self.recurrence_end_date
    }

    pub fn parent_transaction_id(&self) -> Option<Uuid> {
        self.parent_transaction_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

impl Aggregate for Transaction {
    fn aggregate_type() -> &'static str {
        "Transaction"
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

fn validate_amount(amount: &Money) -> Result<(), DomainError> {
    if !amount.is_positive() {
        return Err(DomainError::InvalidAmount(format!(
            "amount must be positive (got {})",
            amount
        )));
    }
    if amount.scale() > MAX_SCALE {
        return Err(DomainError::InvalidAmount(format!(
            "too many decimal places (max {}, got {})",
            MAX_SCALE,
            amount.scale()
        )));
    }
    if amount.amount() > Decimal::new(MAX_AMOUNT, 0) {
        return Err(DomainError::InvalidAmount(format!(
            "amount exceeds maximum allowed value ({})",
            MAX_AMOUNT
        )));
    }
    Ok(())
}

fn normalize_description(description: &str) -> Result<String, DomainError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(DomainError::InvalidDescription(
            "description must not be empty".to_string(),
        ));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(DomainError::InvalidDescription(format!(
            "description exceeds {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(description.to_string())
}

fn validate_recurrence(
    is_recurring: bool,
    frequency: Option<RecurrenceFrequency>,
    end_date: Option<NaiveDate>,
    parent_transaction_id: Option<Uuid>,
    date: NaiveDate,
) -> Result<(), DomainError> {
    if is_recurring {
        if frequency.is_none() {
            return Err(DomainError::InvalidRecurrence(
                "recurring transaction requires a frequency".to_string(),
            ));
        }
        if parent_transaction_id.is_some() {
            return Err(DomainError::InvalidRecurrence(
                "recurring template cannot have a parent".to_string(),
            ));
        }
        if let Some(end) = end_date {
            if end < date {
                return Err(DomainError::InvalidRecurrence(format!(
                    "end date {} precedes transaction date {}",
                    end, date
                )));
            }
        }
    } else if frequency.is_some() || end_date.is_some() {
        return Err(DomainError::InvalidRecurrence(
            "non-recurring transaction cannot carry recurrence settings".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::kinds;
    use crate::domain::{Currency, Event};
    use rust_decimal_macros::dec;

    fn brl(amount: Decimal) -> Money {
        Money::new(amount, Currency::new("BRL").unwrap())
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn new_income(amount: Decimal) -> NewTransaction {
        NewTransaction {
            user_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            transaction_type: TransactionType::Income,
            amount: brl(amount),
            description: "Salary".to_string(),
            date: date("2026-10-01"),
            recurrence: None,
        }
    }

    #[test]
    fn test_create_records_event() {
        let mut tx = Transaction::create(new_income(dec!(250.75))).unwrap();

        assert_eq!(tx.amount().amount(), dec!(250.75));
        assert!(!tx.is_template());
        assert!(!tx.is_instance());

        let events = tx.drain_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            DomainEvent::TransactionCreated(e) => {
                assert_eq!(e.aggregate_id(), tx.id());
                assert_eq!(e.account_id, tx.account_id());
                assert_eq!(e.amount, 25_075);
                assert_eq!(e.currency.code(), "BRL");
                assert!(!e.balance_applied);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(tx.drain_events().is_empty());
    }

    #[test]
    fn test_create_rejects_bad_amounts() {
        for amount in [dec!(0), dec!(-10), dec!(1.005), dec!(1000000000000.01)] {
            let result = Transaction::create(new_income(amount));
            assert!(
                matches!(result, Err(DomainError::InvalidAmount(_))),
                "amount {} accepted",
                amount
            );
        }
    }

    #[test]
    fn test_create_rejects_empty_description() {
        let mut new = new_income(dec!(10));
        new.description = "   ".to_string();
        assert!(matches!(Transaction::create(new), Err(DomainError::InvalidDescription(_))));
    }

    #[test]
    fn test_template_end_date_cannot_precede_date() {
        let mut new = new_income(dec!(10));
        new.recurrence = Some(Recurrence {
            frequency: RecurrenceFrequency::Monthly,
            end_date: Some(date("2026-09-30")),
        });
        assert!(matches!(Transaction::create(new), Err(DomainError::InvalidRecurrence(_))));
    }

    #[test]
    fn test_materialize_instance() {
        let mut new = new_income(dec!(99.90));
        new.recurrence = Some(Recurrence {
            frequency: RecurrenceFrequency::Monthly,
            end_date: None,
        });
        let template = Transaction::create(new).unwrap();
        assert!(template.is_template());

        let instance = template.materialize(date("2026-11-01")).unwrap();
        assert!(instance.is_instance());
        assert_eq!(instance.parent_transaction_id(), Some(template.id()));
        assert_eq!(instance.date(), date("2026-11-01"));
        assert_eq!(instance.account_id(), template.account_id());
        assert_eq!(instance.amount(), template.amount());
        assert_eq!(instance.description(), template.description());
        assert_eq!(instance.recurrence_frequency(), None);
        assert_eq!(instance.pending_events()[0].event_kind(), kinds::TRANSACTION_CREATED);

        // Instances cannot spawn instances
        assert!(instance.materialize(date("2026-12-01")).is_err());
    }

    #[test]
    fn test_update_records_old_and_new_values() {
        let mut tx = Transaction::create(new_income(dec!(100.00))).unwrap();
        tx.drain_events();

        tx.update(TransactionChanges {
            transaction_type: Some(TransactionType::Expense),
            amount: Some(brl(dec!(200.00))),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(tx.transaction_type(), TransactionType::Expense);
        assert_eq!(tx.amount().amount(), dec!(200.00));

        let events = tx.drain_events();
        match &events[..] {
            [DomainEvent::TransactionUpdated(e)] => {
                assert_eq!(e.old_type, TransactionType::Income);
                assert_eq!(e.old_amount, 10_000);
                assert_eq!(e.new_type, TransactionType::Expense);
                assert_eq!(e.new_amount, 20_000);
            }
            other => panic!("unexpected events {:?}", other),
        }
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let mut tx = Transaction::create(new_income(dec!(100.00))).unwrap();
        tx.drain_events();

        let result = tx.update(TransactionChanges {
            transaction_type: Some(TransactionType::Expense),
            description: Some(String::new()),
            ..Default::default()
        });

        assert!(matches!(result, Err(DomainError::InvalidDescription(_))));
        assert_eq!(tx.transaction_type(), TransactionType::Income);
        assert!(tx.pending_events().is_empty());
    }

    #[test]
    fn test_update_rejects_currency_change() {
        let mut tx = Transaction::create(new_income(dec!(100.00))).unwrap();
        let result = tx.update(TransactionChanges {
            amount: Some(Money::new(dec!(5), Currency::new("USD").unwrap())),
            ..Default::default()
        });
        assert!(matches!(result, Err(DomainError::CurrencyMismatch { .. })));
    }

    #[test]
    fn test_mark_deleted() {
        let mut tx = Transaction::create(new_income(dec!(42))).unwrap();
        tx.drain_events();

        tx.mark_deleted().unwrap();
        assert!(tx.is_deleted());
        assert!(matches!(tx.drain_events()[..], [DomainEvent::TransactionDeleted(_)]));

        assert!(matches!(tx.mark_deleted(), Err(DomainError::BusinessRuleViolation(_))));
        assert!(tx.update(TransactionChanges::default()).is_err());
    }
}
