//! Event Bus Errors
//!
//! Aggregate error produced when one or more handlers fail during dispatch.

/// One handler that failed (after any retries) while handling an event
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: anyhow::Error,
}

/// Every handler failure collected while publishing one event
#[derive(Debug, thiserror::Error)]
#[error(
    "{} handler(s) failed for event {event_kind}{}",
    .failures.len(),
    describe_failures(.failures)
)]
pub struct PublishError {
    pub event_kind: String,
    pub failures: Vec<HandlerFailure>,
}

impl PublishError {
    pub fn new(event_kind: &str, failures: Vec<HandlerFailure>) -> Self {
        Self {
            event_kind: event_kind.to_string(),
            failures,
        }
    }

    /// Names of the handlers that failed, in the order they failed
    pub fn failed_handlers(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.handler.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

/// `; handler: error` for each failure, in order
fn describe_failures(failures: &[HandlerFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("; {}: {:#}", f.handler, f.error))
        .collect()
}
