//! In-process EventBus
//!
//! Handlers are registered per event kind and invoked in registration order.
//! The registry sits behind one reader/writer lock; dispatch works on a
//! snapshot taken under the read lock, so a handler registered mid-dispatch
//! does not see the in-flight event.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;

use crate::domain::{DomainEvent, Event};

use super::error::{HandlerFailure, PublishError};
use super::retry::{RetryConfig, RetryingHandler};

/// Reacts to published domain events
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Global observer called once per retry-exhausted handler:
/// `(event_kind, handler_name, error)`
pub type ErrorCallback = Arc<dyn Fn(&str, &str, &anyhow::Error) + Send + Sync>;

/// Adapter turning an async closure into an [`EventHandler`]
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<()> {
        (self.f)(event.clone()).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

#[derive(Clone)]
struct RegisteredHandler {
    name: String,
    handler: Arc<dyn EventHandler>,
}

/// Publish/subscribe registry keyed by event kind
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<RegisteredHandler>>>,
    error_callback: Arc<RwLock<Option<ErrorCallback>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Append a handler for `kind`; it is named `"<kind>#<n>"` in error reports
    pub fn subscribe(&self, kind: &str, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.write_handlers();
        let list = handlers.entry(kind.to_string()).or_default();
        let name = format!("{}#{}", kind, list.len() + 1);
        list.push(RegisteredHandler { name, handler });
    }

    /// Append a handler for `kind` under an explicit name
    pub fn subscribe_named(&self, kind: &str, name: &str, handler: Arc<dyn EventHandler>) {
        self.write_handlers()
            .entry(kind.to_string())
            .or_default()
            .push(RegisteredHandler {
                name: name.to_string(),
                handler,
            });
    }

    /// Append a handler that is retried inline with backoff before its
    /// failure is reported. The error callback fires once on exhaustion.
    pub fn subscribe_with_retry(
        &self,
        kind: &str,
        handler: Arc<dyn EventHandler>,
        config: RetryConfig,
        handler_name: &str,
    ) {
        let wrapped = RetryingHandler::new(
            handler,
            config,
            kind,
            handler_name,
            Arc::clone(&self.error_callback),
        );
        self.subscribe_named(kind, handler_name, Arc::new(wrapped));
    }

    /// Install the global callback for retry-exhausted handlers
    pub fn set_error_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &str, &anyhow::Error) + Send + Sync + 'static,
    {
        let mut slot = self
            .error_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(callback));
    }

    /// Remove every handler for `kind`
    pub fn unsubscribe(&self, kind: &str) {
        self.write_handlers().remove(kind);
    }

    pub fn has_subscribers(&self, kind: &str) -> bool {
        self.subscriber_count(kind) > 0
    }

    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.read_handlers().get(kind).map_or(0, Vec::len)
    }

    /// Remove every handler for every kind
    pub fn clear(&self) {
        self.write_handlers().clear();
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run every handler for the event's kind, in order, on the caller's task.
    ///
    /// A failing handler does not stop the ones after it; all failures are
    /// returned together. No handlers is not an error.
    pub async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let kind = event.event_kind();
        let handlers = self.snapshot(kind);
        let mut failures = Vec::new();

        for registered in handlers {
            if let Err(error) = registered.handler.handle(event).await {
                tracing::warn!(
                    handler = %registered.name,
                    event_kind = %kind,
                    event_id = %event.event_id(),
                    error = %error,
                    "Event handler failed"
                );
                failures.push(HandlerFailure {
                    handler: registered.name,
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PublishError::new(kind, failures))
        }
    }

    /// Publish a drained event buffer in order. Every event is attempted;
    /// the first failure is returned.
    pub async fn publish_all(&self, events: &[DomainEvent]) -> Result<(), PublishError> {
        let mut first_error = None;
        for event in events {
            if let Err(e) = self.publish(event).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Run every handler for the event's kind as its own tokio task.
    ///
    /// Returns immediately; the handle resolves once all tasks finished,
    /// carrying the combined failures. A panicking handler counts as a failure
    /// and never cancels the others. Must be called inside a tokio runtime.
    pub fn publish_async(&self, event: &DomainEvent) -> JoinHandle<Result<(), PublishError>> {
        let kind = event.event_kind().to_string();
        let handlers = self.snapshot(&kind);
        let event = Arc::new(event.clone());
        let failures: Arc<Mutex<Vec<HandlerFailure>>> = Arc::new(Mutex::new(Vec::new()));

        let tasks: Vec<(String, JoinHandle<()>)> = handlers
            .into_iter()
            .map(|registered| {
                let event = Arc::clone(&event);
                let failures = Arc::clone(&failures);
                let name = registered.name.clone();
                let task = tokio::spawn(async move {
                    if let Err(error) = registered.handler.handle(&event).await {
                        tracing::warn!(
                            handler = %registered.name,
                            event_kind = %event.event_kind(),
                            error = %error,
                            "Async event handler failed"
                        );
                        lock(&failures).push(HandlerFailure {
                            handler: registered.name,
                            error,
                        });
                    }
                });
                (name, task)
            })
            .collect();

        tokio::spawn(async move {
            for (name, task) in tasks {
                if let Err(join_error) = task.await {
                    tracing::error!(handler = %name, error = %join_error, "Async event handler panicked");
                    lock(&failures).push(HandlerFailure {
                        handler: name,
                        error: anyhow::anyhow!("handler task aborted: {}", join_error),
                    });
                }
            }

            let failures = std::mem::take(&mut *lock(&failures));
            if failures.is_empty() {
                Ok(())
            } else {
                Err(PublishError::new(&kind, failures))
            }
        })
    }

    fn snapshot(&self, kind: &str) -> Vec<RegisteredHandler> {
        self.read_handlers().get(kind).cloned().unwrap_or_default()
    }

    fn read_handlers(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<RegisteredHandler>>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_handlers(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<RegisteredHandler>>> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
