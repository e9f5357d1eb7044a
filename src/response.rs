//! Response classification and the 429 / 5xx handlers.
//!
//! The wire contract of the target service:
//!
//! | Status | Meaning | Action |
//! |---|---|---|
//! | 200, 204 | accepted | done |
//! | 429 | rate limited, optional `Retry-After: <seconds>` | wait, retry |
//! | 5xx | provider overload | back off, retry up to `max_retries` |
//! | anything else | malformed request | fail, never replay |

use crate::backoff::RetryPolicy;
use crate::budget::{await_with_budget, DeliveryBudget};
use crate::clock::Clock;
use crate::error::{DeliveryError, Result};
use crate::events::{emit, DeliveryEvent, EventHandler};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What one outer attempt produced.
///
/// Variants that need further handling keep the response so the handler can
/// read its headers and release it; the others have already released it.
#[derive(Debug)]
pub enum Outcome {
    /// 200 or 204.
    Success(StatusCode),
    /// 429.
    RateLimited(Response),
    /// Any 5xx.
    ServerError(Response),
    /// Every other status. Mostly 4xx, but also unexpected 1xx/2xx/3xx.
    ClientError(StatusCode),
    /// No response was obtained.
    TransportFailure(DeliveryError),
}

impl Outcome {
    pub fn from_result(result: Result<Response>) -> Self {
        let response = match result {
            Ok(response) => response,
            Err(err) => return Outcome::TransportFailure(err),
        };
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            Outcome::RateLimited(response)
        } else if status.is_server_error() {
            Outcome::ServerError(response)
        } else if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            Outcome::Success(status)
        } else {
            Outcome::ClientError(status)
        }
    }
}

/// Parse a `Retry-After` header expressed in seconds.
///
/// Fractional seconds are accepted. Negative, non-finite, and HTTP-date
/// values yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let secs: f64 = raw.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Everything a handler needs to schedule a wait.
pub struct WaitScope<'a> {
    pub cancel: &'a CancellationToken,
    pub budget: &'a DeliveryBudget,
    pub policy: &'a RetryPolicy,
    pub clock: &'a dyn Clock,
    pub events: &'a Option<Arc<dyn EventHandler>>,
}

impl WaitScope<'_> {
    async fn wait(&self, attempt: u32, delay: Duration, status: StatusCode) -> Result<()> {
        tracing::debug!(
            attempt,
            status = status.as_u16(),
            delay_ms = delay.as_millis() as u64,
            "backing off before next attempt"
        );
        emit(
            self.events,
            DeliveryEvent::Backoff {
                attempt,
                delay,
                status,
            },
        );
        await_with_budget(self.cancel, delay, self.budget, self.clock).await
    }
}

/// Handle a 429.
///
/// `Ok(())` means the wait completed and the caller should retry; any error
/// from the budget check or cancellation is returned unchanged.
pub async fn handle_rate_limited(
    scope: &WaitScope<'_>,
    response: Response,
    attempt: u32,
) -> Result<()> {
    let status = response.status();
    let hint = parse_retry_after(response.headers());
    drop(response);

    let delay = match hint {
        Some(hint) => hint,
        None => scope.policy.delay_for_attempt(attempt),
    };
    scope.wait(attempt, delay, status).await
}

/// Handle a 5xx.
///
/// Statuses below 500 are not this handler's concern and return `Ok(())`.
/// Past `max_retries` the delivery fails with [`DeliveryError::MaxRetries`].
pub async fn handle_server_error(
    scope: &WaitScope<'_>,
    response: Response,
    attempt: u32,
) -> Result<()> {
    let status = response.status();
    drop(response);

    if !status.is_server_error() {
        return Ok(());
    }
    if attempt >= scope.policy.max_retries {
        return Err(DeliveryError::MaxRetries {
            attempts: attempt + 1,
        });
    }

    let delay = scope.policy.delay_for_attempt(attempt);
    scope.wait(attempt, delay, status).await
}
