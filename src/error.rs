use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by [`HttpClient`](crate::client::HttpClient) implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the delivery engine and its components.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The caller's cancellation token fired during a wait or an HTTP call.
    #[error("{phase}: delivery cancelled")]
    Cancelled {
        /// Which step was in progress when the token fired.
        phase: &'static str,
    },

    /// The wall-clock budget ran out before a new attempt could begin.
    #[error("max retry timeout exceeded after {limit:?}")]
    RetryTimeout {
        /// The configured `max_retry_timeout`.
        limit: Duration,
    },

    /// A required wait would have pushed the delivery past its budget.
    ///
    /// Raised before sleeping, so no time is spent on a wait that cannot
    /// be followed by another attempt.
    #[error("wait time {wait:?} would exceed max retry timeout {limit:?}: rate limited")]
    RateLimited {
        /// The wait that was refused.
        wait: Duration,
        /// The configured `max_retry_timeout`.
        limit: Duration,
    },

    /// The outer attempt loop (or the transport loop) ran out of retries.
    #[error("max retries exceeded after {attempts} attempts")]
    MaxRetries {
        /// Number of attempts made.
        attempts: u32,
    },

    /// The target answered with a status that will not succeed on replay.
    #[error("unexpected response status code: {status}")]
    UnexpectedStatus {
        /// The status returned by the target service.
        status: StatusCode,
    },

    /// Low-level transport failure that was either permanent or outlived
    /// the transport retries.
    #[error("{phase}: {source}")]
    Transport {
        /// Which step failed.
        phase: &'static str,
        /// The error reported by the HTTP client.
        #[source]
        source: BoxError,
    },

    /// Building a request failed (bad URL, invalid header, client build).
    #[error("HTTP request could not be built: {0}")]
    Request(#[from] reqwest::Error),

    /// The target URL could not be parsed.
    #[error("invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Payload serialization failed.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The request builder produced a streaming body that cannot be replayed.
    #[error("request body is not replayable (streaming bodies are not supported)")]
    BodyNotReplayable,

    /// Attempted to deliver an empty payload.
    #[error("payload is empty")]
    EmptyPayload,

    /// Invalid configuration detected at build time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DeliveryError {
    /// Whether the caller's cancellation token ended the delivery.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeliveryError::Cancelled { .. })
    }

    /// Whether the wall-clock budget ended the delivery, either before an
    /// attempt or before a wait.
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(
            self,
            DeliveryError::RetryTimeout { .. } | DeliveryError::RateLimited { .. }
        )
    }

    /// The HTTP status behind this error, if the target service answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DeliveryError::UnexpectedStatus { status } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeliveryError>;
