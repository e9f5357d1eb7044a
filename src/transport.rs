//! Transport-level retry for failures that happen before any response exists.
//!
//! This loop is independent of the orchestrator's attempt counter: it gets
//! `max_transport_retries` retries of its own per outer attempt and never
//! looks at HTTP status codes.

use crate::backoff::RetryPolicy;
use crate::classify::is_transient;
use crate::client::HttpClient;
use crate::clock::Clock;
use crate::error::{DeliveryError, Result};
use crate::events::{emit, DeliveryEvent, EventHandler};
use crate::request::ReplayableRequest;
use reqwest::Response;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const PHASE: &str = "making HTTP POST request";

/// Send `request`, retrying transient transport errors with backoff.
///
/// Returns the first response obtained, whatever its status. A permanent
/// error, or a transient one after the last retry, is returned wrapped in
/// [`DeliveryError::Transport`]. Cancellation during the call or the wait
/// returns [`DeliveryError::Cancelled`].
pub async fn execute_with_transport_retry(
    cancel: &CancellationToken,
    client: &dyn HttpClient,
    request: &ReplayableRequest,
    policy: &RetryPolicy,
    clock: &dyn Clock,
    events: &Option<Arc<dyn EventHandler>>,
) -> Result<Response> {
    let max = policy.max_transport_retries;

    for transport_attempt in 0..=max {
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DeliveryError::Cancelled { phase: PHASE });
            }
            sent = client.send(request.to_request()) => sent,
        };

        let err = match sent {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        if transport_attempt >= max || !is_transient(&*err) {
            tracing::warn!(
                transport_attempt,
                error = %err,
                "transport failure is not retryable"
            );
            return Err(DeliveryError::Transport {
                phase: PHASE,
                source: err,
            });
        }

        let delay = policy.delay_for_attempt(transport_attempt);
        tracing::debug!(
            transport_attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient transport failure, retrying"
        );
        emit(
            events,
            DeliveryEvent::TransportRetry {
                attempt: transport_attempt + 1,
                delay,
                reason: err.to_string(),
            },
        );

        if cancel.is_cancelled() {
            return Err(DeliveryError::Cancelled { phase: PHASE });
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DeliveryError::Cancelled { phase: PHASE });
            }
            _ = clock.sleep(delay) => {}
        }
    }

    Err(DeliveryError::MaxRetries { attempts: max + 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockHttpClient, MockReply};
    use crate::clock::{MockClock, SystemClock};
    use crate::error::BoxError;
    use crate::request::{JsonRequestBuilder, RequestBuilder};
    use async_trait::async_trait;
    use reqwest::Request;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// A client whose requests never complete.
    #[derive(Default)]
    struct StalledClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HttpClient for StalledClient {
        async fn send(&self, _request: Request) -> std::result::Result<Response, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending().await
        }
    }

    fn cancel_after(cancel: &CancellationToken, after: Duration) {
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            trigger.cancel();
        });
    }

    async fn replayable() -> ReplayableRequest {
        let builder = JsonRequestBuilder::new(r#"{"content":"hello"}"#).unwrap();
        let request = builder
            .build(&CancellationToken::new(), "https://hooks.example.com/t")
            .await
            .unwrap();
        ReplayableRequest::from_request(request).unwrap()
    }

    #[tokio::test]
    async fn test_success_returns_immediately() {
        let client = MockHttpClient::always(204);
        let clock = MockClock::new();
        let response = execute_with_transport_retry(
            &CancellationToken::new(),
            &client,
            &replayable().await,
            &RetryPolicy::default(),
            &clock,
            &None,
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 204);
        assert_eq!(client.call_count(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_any_status_is_handed_upward() {
        let client = MockHttpClient::always(503);
        let clock = MockClock::new();
        let response = execute_with_transport_retry(
            &CancellationToken::new(),
            &client,
            &replayable().await,
            &RetryPolicy::default(),
            &clock,
            &None,
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 503);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_deadline_then_success_sleeps_once() {
        let client = MockHttpClient::new(vec![
            MockReply::error(io::ErrorKind::TimedOut, "context deadline exceeded"),
            MockReply::status(204),
        ]);
        let clock = MockClock::new();
        let response = execute_with_transport_retry(
            &CancellationToken::new(),
            &client,
            &replayable().await,
            &RetryPolicy::default(),
            &clock,
            &None,
        )
        .await
        .unwrap();

        assert_eq!(response.status(), 204);
        assert_eq!(client.call_count(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_transient_errors_exhaust_after_four_tries() {
        let client = MockHttpClient::new(vec![MockReply::error(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )]);
        let clock = MockClock::new();
        let err = execute_with_transport_retry(
            &CancellationToken::new(),
            &client,
            &replayable().await,
            &RetryPolicy::default(),
            &clock,
            &None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DeliveryError::Transport { phase: PHASE, .. }));
        assert_eq!(client.call_count(), 4);
        assert_eq!(
            clock.sleeps(),
            [1, 2, 4].map(Duration::from_secs).to_vec()
        );
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let client = MockHttpClient::new(vec![MockReply::error(
            io::ErrorKind::Other,
            "tls handshake failed: unknown certificate",
        )]);
        let clock = MockClock::new();
        let err = execute_with_transport_retry(
            &CancellationToken::new(),
            &client,
            &replayable().await,
            &RetryPolicy::default(),
            &clock,
            &None,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().starts_with("making HTTP POST request: "));
        assert_eq!(client.call_count(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let client = MockHttpClient::always(204);
        let clock = MockClock::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = execute_with_transport_retry(
            &cancel,
            &client,
            &replayable().await,
            &RetryPolicy::default(),
            &clock,
            &None,
        )
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_request_in_flight() {
        let client = StalledClient::default();
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_secs(5));

        let err = execute_with_transport_retry(
            &cancel,
            &client,
            &replayable().await,
            &RetryPolicy::default(),
            &SystemClock,
            &None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DeliveryError::Cancelled { phase: PHASE }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_transport_backoff() {
        let client = MockHttpClient::new(vec![MockReply::error(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )]);
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(500));

        let err = execute_with_transport_retry(
            &cancel,
            &client,
            &replayable().await,
            &RetryPolicy::default(),
            &SystemClock,
            &None,
        )
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        // Cancelled inside the 1s wait, so the retry is never sent.
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_every_try_sends_identical_body() {
        let client = MockHttpClient::new(vec![
            MockReply::error(io::ErrorKind::ConnectionRefused, "connection refused"),
            MockReply::error(io::ErrorKind::TimedOut, "i/o timeout"),
            MockReply::status(200),
        ]);
        let clock = MockClock::new();
        execute_with_transport_retry(
            &CancellationToken::new(),
            &client,
            &replayable().await,
            &RetryPolicy::default(),
            &clock,
            &None,
        )
        .await
        .unwrap();

        let bodies = client.bodies();
        assert_eq!(bodies.len(), 3);
        assert!(bodies.iter().all(|b| b == &bodies[0]));
        assert_eq!(bodies[0], r#"{"content":"hello"}"#);
    }
}
