//! Event hooks for delivery progress.
//!
//! Provides an optional, non-intrusive way to observe a delivery. The engine
//! emits events when an attempt starts, before every wait, and when the
//! delivery finishes. Implement [`EventHandler`] to feed metrics, audit logs,
//! or progress displays. Structured logging through `tracing` happens
//! regardless of whether a handler is installed.

use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// Events emitted during a delivery.
#[derive(Debug, Clone)]
pub enum DeliveryEvent {
    /// An outer attempt is starting (0-indexed).
    AttemptStart { attempt: u32 },

    /// A transport-level retry after a failure with no response.
    TransportRetry {
        /// The retry number within the transport loop (1-indexed).
        attempt: u32,
        /// Delay before the retry.
        delay: Duration,
        /// Error description.
        reason: String,
    },

    /// The orchestrator is about to wait after a 429 or 5xx.
    Backoff {
        /// The outer attempt that produced the status (0-indexed).
        attempt: u32,
        /// Delay before the next attempt.
        delay: Duration,
        /// Status that triggered the wait.
        status: StatusCode,
    },

    /// The target accepted the payload.
    Delivered { attempts: u32, status: StatusCode },

    /// The delivery ended with an error.
    Failed { attempts: u32, reason: String },
}

/// Handler for delivery events.
///
/// # Example
///
/// ```
/// use webhook_courier::events::{DeliveryEvent, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: DeliveryEvent) {
///         match event {
///             DeliveryEvent::Backoff { delay, status, .. } => {
///                 println!("{} received, waiting {:?}", status, delay)
///             }
///             DeliveryEvent::Failed { reason, .. } => println!("gave up: {}", reason),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: DeliveryEvent);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: DeliveryEvent) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use webhook_courier::events::{DeliveryEvent, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: DeliveryEvent| {
///     if let DeliveryEvent::Delivered { attempts, .. } = event {
///         println!("delivered after {} attempts", attempts);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(DeliveryEvent) + Send + Sync>(pub F);

impl<F: Fn(DeliveryEvent) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: DeliveryEvent) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_without_handler_is_noop() {
        emit(&None, DeliveryEvent::AttemptStart { attempt: 0 });
    }

    #[test]
    fn test_fn_handler_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Arc<dyn EventHandler> = Arc::new(FnEventHandler(move |event: DeliveryEvent| {
            if let DeliveryEvent::AttemptStart { attempt } = event {
                sink.lock().unwrap().push(attempt);
            }
        }));

        let handler = Some(handler);
        emit(&handler, DeliveryEvent::AttemptStart { attempt: 0 });
        emit(&handler, DeliveryEvent::AttemptStart { attempt: 1 });

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }
}
