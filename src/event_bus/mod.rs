//! Event Bus module
//!
//! In-process publish/subscribe for domain events, with optional per-handler
//! retry and exponential backoff. Events are not persisted.

mod bus;
mod error;
mod retry;

pub use bus::{handler_fn, ErrorCallback, EventBus, EventHandler, FnHandler};
pub use error::{HandlerFailure, PublishError};
pub use retry::RetryConfig;
