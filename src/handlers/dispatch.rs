//! Shared exit paths for command handlers
//!
//! Rollback of an abandoned Unit of Work and post-commit publication.

use crate::domain::{DomainEvent, Event};
use crate::event_bus::EventBus;
use crate::repository::UnitOfWork;

/// Roll back if the Unit of Work is still open. Rollback failures are logged;
/// the error that caused the exit is what the caller reports.
pub(crate) async fn rollback_if_open(uow: &mut dyn UnitOfWork) {
    if !uow.is_in_transaction() {
        return;
    }
    if let Err(e) = uow.rollback().await {
        tracing::error!(error = %e, "Rollback failed");
    }
}

/// Publish events raised by an already persisted change.
///
/// `balance_applied` is stamped on every event when the publisher moved the
/// account balance itself. Publish failures never undo the write; they are
/// logged and dropped.
pub(crate) async fn publish_committed(
    event_bus: &EventBus,
    mut events: Vec<DomainEvent>,
    balance_applied: bool,
) {
    if events.is_empty() {
        return;
    }
    if balance_applied {
        events.iter_mut().for_each(DomainEvent::mark_balance_applied);
    }

    if let Err(e) = event_bus.publish_all(&events).await {
        tracing::warn!(
            event_kind = %e.event_kind,
            failed_handlers = ?e.failed_handlers(),
            "Event publication failed after commit: {}",
            e
        );
        return;
    }

    for event in &events {
        tracing::debug!(
            event_kind = %event.event_kind(),
            aggregate_id = %event.aggregate_id(),
            balance_applied,
            "Event published"
        );
    }
}
