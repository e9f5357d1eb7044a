//! Wall-clock budget for a single delivery.
//!
//! Every rate-limit and server-error wait goes through [`await_with_budget`],
//! so no wait is ever scheduled past `max_retry_timeout`.

use crate::clock::Clock;
use crate::error::{DeliveryError, Result};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Start instant plus ceiling for one delivery call.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryBudget {
    start: Instant,
    limit: Duration,
}

impl DeliveryBudget {
    /// Start a budget at the clock's current instant.
    pub fn start(clock: &dyn Clock, limit: Duration) -> Self {
        Self {
            start: clock.now(),
            limit,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn elapsed(&self, clock: &dyn Clock) -> Duration {
        clock.now().saturating_duration_since(self.start)
    }

    pub fn remaining(&self, clock: &dyn Clock) -> Duration {
        self.limit.saturating_sub(self.elapsed(clock))
    }

    /// True once more than `limit` has passed since the start.
    pub fn is_exhausted(&self, clock: &dyn Clock) -> bool {
        self.elapsed(clock) > self.limit
    }

    /// Whether a wait of `wait` still ends within the budget.
    ///
    /// Once the budget is spent nothing is admitted, not even a zero wait.
    pub fn admits(&self, clock: &dyn Clock, wait: Duration) -> bool {
        self.elapsed(clock)
            .checked_add(wait)
            .is_some_and(|end| end <= self.limit)
    }
}

/// Wait `wait` unless it would overrun the budget or the caller cancels.
///
/// - Overrun: returns [`DeliveryError::RateLimited`] without sleeping.
/// - Cancelled before or during the wait: returns [`DeliveryError::Cancelled`].
pub async fn await_with_budget(
    cancel: &CancellationToken,
    wait: Duration,
    budget: &DeliveryBudget,
    clock: &dyn Clock,
) -> Result<()> {
    if !budget.admits(clock, wait) {
        tracing::debug!(
            wait_ms = wait.as_millis() as u64,
            remaining_ms = budget.remaining(clock).as_millis() as u64,
            "wait would exceed delivery budget"
        );
        return Err(DeliveryError::RateLimited {
            wait,
            limit: budget.limit(),
        });
    }

    if cancel.is_cancelled() {
        return Err(DeliveryError::Cancelled {
            phase: "context canceled during wait",
        });
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeliveryError::Cancelled {
            phase: "context canceled during wait",
        }),
        _ = clock.sleep(wait) => Ok(()),
    }
}
