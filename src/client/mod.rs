//! HTTP client seam.
//!
//! The engine only needs one operation, [`HttpClient::send`]. Production code
//! uses `reqwest::Client`; tests use [`MockHttpClient`], which replays scripted
//! replies and records every request it receives.

pub mod mock;

pub use mock::{MockHttpClient, MockReply, RecordedRequest};

use crate::error::{BoxError, DeliveryError, Result};
use async_trait::async_trait;
use reqwest::{Client, Request, Response};
use std::time::Duration;

/// Per-request timeout of the client built by [`default_client`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one HTTP request.
///
/// Any response, whatever its status, is `Ok`: status interpretation belongs
/// to the orchestrator. `Err` is reserved for failures before a response
/// exists (DNS, refused or reset connections, client-side timeouts).
///
/// Implementations must be safe to share between concurrent deliveries.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: Request) -> std::result::Result<Response, BoxError>;
}

#[async_trait]
impl HttpClient for Client {
    async fn send(&self, request: Request) -> std::result::Result<Response, BoxError> {
        self.execute(request).await.map_err(Into::into)
    }
}

/// Build a `reqwest::Client` with the given per-request timeout.
pub fn default_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(DeliveryError::Request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_builds() {
        assert!(default_client(DEFAULT_TIMEOUT).is_ok());
    }
}
