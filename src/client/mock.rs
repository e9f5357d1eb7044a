//! Scripted HTTP client for testing without a live endpoint.
//!
//! [`MockHttpClient`] returns pre-configured replies in order, cycling back
//! to the first when exhausted, and records every request it was asked to
//! send.
//!
//! # Example
//!
//! ```
//! use webhook_courier::client::{MockHttpClient, MockReply};
//!
//! let client = MockHttpClient::new(vec![
//!     MockReply::rate_limited(Some("2")),
//!     MockReply::status(204),
//! ]);
//! assert_eq!(client.call_count(), 0);
//! ```

use super::HttpClient;
use crate::clock::{Clock, MockClock};
use crate::error::BoxError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, Request, Response, Url};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with a status code and headers.
    Status {
        status: u16,
        headers: Vec<(String, String)>,
    },
    /// Fail before any response exists, with an `io::Error` of this kind.
    Error { kind: io::ErrorKind, message: String },
}

impl MockReply {
    pub fn status(status: u16) -> Self {
        MockReply::Status {
            status,
            headers: Vec::new(),
        }
    }

    /// A 429, optionally carrying a raw `Retry-After` header value.
    pub fn rate_limited(retry_after: Option<&str>) -> Self {
        let reply = Self::status(429);
        match retry_after {
            Some(value) => reply.with_header("Retry-After", value),
            None => reply,
        }
    }

    pub fn error(kind: io::ErrorKind, message: impl Into<String>) -> Self {
        MockReply::Error {
            kind,
            message: message.into(),
        }
    }

    /// Add a response header. No effect on [`MockReply::Error`].
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let MockReply::Status { headers, .. } = &mut self {
            headers.push((name.into(), value.into()));
        }
        self
    }

    fn into_result(self) -> Result<Response, BoxError> {
        match self {
            MockReply::Status { status, headers } => {
                let mut builder = http::Response::builder().status(status);
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                let response = builder.body(Vec::<u8>::new())?;
                Ok(Response::from(response))
            }
            MockReply::Error { kind, message } => Err(Box::new(io::Error::new(kind, message))),
        }
    }
}

/// A request as seen by [`MockHttpClient`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A test client that answers with canned replies in order.
#[derive(Debug)]
pub struct MockHttpClient {
    replies: Vec<MockReply>,
    index: AtomicUsize,
    calls: Mutex<Vec<RecordedRequest>>,
    latency: Option<(Arc<MockClock>, Duration)>,
}

impl MockHttpClient {
    /// Create a mock client with the given replies.
    ///
    /// Replies are returned in order. When exhausted, cycles from the beginning.
    pub fn new(replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "MockHttpClient requires at least one reply");
        Self {
            replies,
            index: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    /// A client that always answers with `status`.
    pub fn always(status: u16) -> Self {
        Self::new(vec![MockReply::status(status)])
    }

    /// Advance `clock` by `per_call` on every request, simulating time spent
    /// on the wire.
    pub fn with_latency(mut self, clock: Arc<MockClock>, per_call: Duration) -> Self {
        self.latency = Some((clock, per_call));
        self
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    pub fn calls(&self) -> Vec<RecordedRequest> {
        self.lock_calls().clone()
    }

    /// Bodies of every recorded request, in order.
    pub fn bodies(&self) -> Vec<Bytes> {
        self.lock_calls().iter().map(|c| c.body.clone()).collect()
    }

    fn next_reply(&self) -> MockReply {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        self.replies[idx].clone()
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<RecordedRequest>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: Request) -> Result<Response, BoxError> {
        let body = request
            .body()
            .and_then(|b| b.as_bytes())
            .map(Bytes::copy_from_slice)
            .unwrap_or_default();
        self.lock_calls().push(RecordedRequest {
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
            body,
        });

        if let Some((clock, per_call)) = &self.latency {
            clock.advance(*per_call);
        }

        self.next_reply().into_result()
    }
}
