//! Retry policy for event handlers
//!
//! A handler subscribed with retry is wrapped in [`RetryingHandler`], which
//! re-runs it inline with capped exponential backoff.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::domain::DomainEvent;

use super::bus::{ErrorCallback, EventHandler};

/// Backoff settings for a retried handler
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = 1 + max_retries)
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait before retry number `attempt` (0-based):
    /// `min(max_delay, initial_delay * backoff_multiplier^attempt)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        let nanos = self.initial_delay.as_nanos() as f64 * factor;

        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.max(0.0).round() as u64)
    }
}

/// Wraps a handler so that failures are retried before being reported
pub(crate) struct RetryingHandler {
    inner: Arc<dyn EventHandler>,
    config: RetryConfig,
    event_kind: String,
    handler_name: String,
    error_callback: Arc<RwLock<Option<ErrorCallback>>>,
}

impl RetryingHandler {
    pub(crate) fn new(
        inner: Arc<dyn EventHandler>,
        config: RetryConfig,
        event_kind: &str,
        handler_name: &str,
        error_callback: Arc<RwLock<Option<ErrorCallback>>>,
    ) -> Self {
        Self {
            inner,
            config,
            event_kind: event_kind.to_string(),
            handler_name: handler_name.to_string(),
            error_callback,
        }
    }

    fn report_exhausted(&self, error: &anyhow::Error) {
        let callback = match self.error_callback.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(callback) = callback {
            callback(&self.event_kind, &self.handler_name, error);
        }
    }
}

#[async_trait]
impl EventHandler for RetryingHandler {
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.inner.handle(event).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt);
                    attempt += 1;
                    tracing::warn!(
                        handler = %self.handler_name,
                        event_kind = %self.event_kind,
                        attempt = attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Event handler failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        handler = %self.handler_name,
                        event_kind = %self.event_kind,
                        attempts = attempt + 1,
                        error = %e,
                        "Event handler failed after retries"
                    );
                    self.report_exhausted(&e);
                    return Err(e.context(format!(
                        "handler '{}' failed after {} attempt(s)",
                        self.handler_name,
                        attempt + 1
                    )));
                }
            }
        }
    }
}
