//! The delivery orchestrator.
//!
//! [`Deliverer`] carries the HTTP client, clock, retry policy, and optional
//! event handler. It is designed to be constructed once and shared: every
//! call to [`Deliverer::deliver`] owns its own budget, attempt counter, and
//! buffered body, so concurrent deliveries need no locking.
//!
//! ```text
//! deliver ─► RequestBuilder::build ─► ReplayableRequest
//!    ▲                                      │
//!    │                          execute_with_transport_retry
//!    │                                      │
//!    │         ┌──────────────┬─────────────┼──────────────┐
//!    │       429            5xx        200 / 204         other
//!    │         │              │             │              │
//!    └── handle_rate_limited  handle_server_error   Ok   UnexpectedStatus
//! ```

use crate::backoff::RetryPolicy;
use crate::budget::DeliveryBudget;
use crate::client::{default_client, HttpClient, DEFAULT_TIMEOUT};
use crate::clock::{Clock, SystemClock};
use crate::error::{DeliveryError, Result};
use crate::events::{emit, DeliveryEvent, EventHandler};
use crate::request::{JsonRequestBuilder, ReplayableRequest, RequestBuilder};
use crate::response::{handle_rate_limited, handle_server_error, Outcome, WaitScope};
use crate::transport::execute_with_transport_retry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Resilient webhook sender.
///
/// # Example
///
/// ```no_run
/// use webhook_courier::Deliverer;
/// use serde_json::json;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> webhook_courier::Result<()> {
/// let deliverer = Deliverer::builder().build()?;
/// let cancel = CancellationToken::new();
/// deliverer
///     .send_json(&cancel, "https://hooks.example.com/abc", &json!({"content": "build passed"}))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Deliverer {
    client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    events: Option<Arc<dyn EventHandler>>,
}

impl Deliverer {
    pub fn builder() -> DelivererBuilder {
        DelivererBuilder {
            client: None,
            clock: None,
            policy: None,
            events: None,
            timeout: None,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver the request produced by `builder` to `url`.
    ///
    /// Returns `Ok(())` once the target answers 200 or 204. Every other
    /// ending is a single error: cancellation, budget exhaustion, retries
    /// exhausted, a non-retryable status, or a transport failure.
    pub async fn deliver(
        &self,
        cancel: &CancellationToken,
        builder: &dyn RequestBuilder,
        url: &str,
    ) -> Result<()> {
        let result = self.run(cancel, builder, url).await;
        match &result {
            Ok(attempts) => {
                tracing::debug!(attempts, "delivery succeeded");
            }
            Err((attempts, err)) => {
                tracing::warn!(attempts, error = %err, "delivery failed");
                emit(
                    &self.events,
                    DeliveryEvent::Failed {
                        attempts: *attempts,
                        reason: err.to_string(),
                    },
                );
            }
        }
        result.map(|_| ()).map_err(|(_, err)| err)
    }

    /// Serialize `payload` as JSON and [`deliver`](Self::deliver) it.
    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        payload: &T,
    ) -> Result<()> {
        let builder = JsonRequestBuilder::from_value(payload)?;
        self.deliver(cancel, &builder, url).await
    }

    /// The attempt loop. Returns the number of attempts made alongside the
    /// result so `deliver` can report it.
    async fn run(
        &self,
        cancel: &CancellationToken,
        builder: &dyn RequestBuilder,
        url: &str,
    ) -> std::result::Result<u32, (u32, DeliveryError)> {
        let clock = self.clock.as_ref();
        let budget = DeliveryBudget::start(clock, self.policy.max_retry_timeout);
        let scope = WaitScope {
            cancel,
            budget: &budget,
            policy: &self.policy,
            clock,
            events: &self.events,
        };

        for attempt in 0..=self.policy.max_retries {
            let made = attempt + 1;
            if budget.is_exhausted(clock) {
                return Err((
                    attempt,
                    DeliveryError::RetryTimeout {
                        limit: budget.limit(),
                    },
                ));
            }
            if cancel.is_cancelled() {
                return Err((
                    attempt,
                    DeliveryError::Cancelled {
                        phase: "starting attempt",
                    },
                ));
            }

            emit(&self.events, DeliveryEvent::AttemptStart { attempt });
            tracing::trace!(attempt, url, "starting delivery attempt");

            let request = builder
                .build(cancel, url)
                .await
                .and_then(ReplayableRequest::from_request)
                .map_err(|err| (made, err))?;

            let sent = execute_with_transport_retry(
                cancel,
                self.client.as_ref(),
                &request,
                &self.policy,
                clock,
                &self.events,
            )
            .await;

            match Outcome::from_result(sent) {
                Outcome::Success(status) => {
                    emit(
                        &self.events,
                        DeliveryEvent::Delivered {
                            attempts: made,
                            status,
                        },
                    );
                    return Ok(made);
                }
                Outcome::RateLimited(response) => {
                    handle_rate_limited(&scope, response, attempt)
                        .await
                        .map_err(|err| (made, err))?;
                }
                Outcome::ServerError(response) => {
                    handle_server_error(&scope, response, attempt)
                        .await
                        .map_err(|err| (made, err))?;
                }
                Outcome::ClientError(status) => {
                    return Err((made, DeliveryError::UnexpectedStatus { status }));
                }
                Outcome::TransportFailure(err) => return Err((made, err)),
            }
        }

        let attempts = self.policy.max_retries + 1;
        Err((attempts, DeliveryError::MaxRetries { attempts }))
    }
}

impl std::fmt::Debug for Deliverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deliverer")
            .field("policy", &self.policy)
            .field("has_event_handler", &self.events.is_some())
            .finish()
    }
}

/// Builder for [`Deliverer`].
pub struct DelivererBuilder {
    client: Option<Arc<dyn HttpClient>>,
    clock: Option<Arc<dyn Clock>>,
    policy: Option<RetryPolicy>,
    events: Option<Arc<dyn EventHandler>>,
    timeout: Option<Duration>,
}

impl DelivererBuilder {
    /// Set the HTTP client. If not set, a `reqwest::Client` is created.
    pub fn client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the clock. Default: [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the retry policy. Default: [`RetryPolicy::standard()`].
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.events = Some(handler);
        self
    }

    /// Set the per-request timeout. Default: 30 seconds.
    ///
    /// Only applies to the client built when none is supplied via
    /// [`client`](Self::client).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the deliverer, validating the policy.
    pub fn build(self) -> Result<Deliverer> {
        let policy = self.policy.unwrap_or_default();
        policy.validate()?;

        let client: Arc<dyn HttpClient> = match self.client {
            Some(client) => client,
            None => Arc::new(default_client(self.timeout.unwrap_or(DEFAULT_TIMEOUT))?),
        };

        Ok(Deliverer {
            client,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            policy,
            events: self.events,
        })
    }
}
