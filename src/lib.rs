//! # Webhook Courier
//!
//! Resilient delivery of a single webhook payload to a rate-limited target
//! service.
//!
//! A delivery POSTs one buffered payload and survives three kinds of trouble:
//! network failures before any response exists, server errors, and explicit
//! rate limiting. All of it stays within a fixed wall-clock budget, and the
//! caller can abort at any point through a [`CancellationToken`].
//!
//! Payload construction, authentication, and provider-specific formatting
//! belong to the caller. This crate provides what happens between "here are
//! the bytes" and "the target accepted them".
//!
//! ## Core Concepts
//!
//! - **[`Deliverer`]**: the orchestrator. Drives outer attempts, dispatches
//!   on status (429 / 5xx / 200-204 / other), and owns the budget.
//! - **[`execute_with_transport_retry`](transport::execute_with_transport_retry)**
//!   runs the inner loop for failures that produce no response at all.
//! - **[`is_transient`](classify::is_transient)** decides which transport
//!   errors are worth retrying.
//! - **[`RetryPolicy`]** holds every tunable constant, defaulting to the target's
//!   contract (5 retries, 3 transport retries, 1s doubling to 64s, 5 minutes).
//! - **[`Clock`]** / **[`HttpClient`]** are the seams with deterministic
//!   test doubles ([`MockClock`], [`MockHttpClient`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use webhook_courier::{Deliverer, JsonRequestBuilder};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let deliverer = Deliverer::builder().build()?;
//!     let payload = JsonRequestBuilder::new(r#"{"content":"nightly build passed"}"#)?;
//!
//!     deliverer
//!         .deliver(&CancellationToken::new(), &payload, "https://hooks.example.com/abc")
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without sleeping
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use webhook_courier::{Deliverer, JsonRequestBuilder, MockClock, MockHttpClient};
//!
//! # tokio_test::block_on(async {
//! let client = Arc::new(MockHttpClient::always(500));
//! let clock = Arc::new(MockClock::new());
//! let deliverer = Deliverer::builder()
//!     .client(client.clone())
//!     .clock(clock.clone())
//!     .build()
//!     .unwrap();
//!
//! let payload = JsonRequestBuilder::new("{}").unwrap();
//! let err = deliverer
//!     .deliver(&CancellationToken::new(), &payload, "https://hooks.example.com/abc")
//!     .await
//!     .unwrap_err();
//!
//! assert_eq!(client.call_count(), 6);
//! assert_eq!(clock.sleeps().iter().sum::<Duration>(), Duration::from_secs(31));
//! # let _ = err;
//! # });
//! ```

pub mod backoff;
pub mod budget;
pub mod classify;
pub mod client;
pub mod clock;
pub mod delivery;
pub mod error;
pub mod events;
pub mod request;
pub mod response;
pub mod transport;

pub use backoff::{JitterStrategy, RetryPolicy};
pub use budget::DeliveryBudget;
pub use classify::is_transient;
pub use client::{HttpClient, MockHttpClient, MockReply};
pub use clock::{Clock, MockClock, SystemClock};
pub use delivery::{Deliverer, DelivererBuilder};
pub use error::{BoxError, DeliveryError, Result};
pub use events::{DeliveryEvent, EventHandler, FnEventHandler};
pub use request::{JsonRequestBuilder, ReplayableRequest, RequestBuilder};
pub use response::Outcome;

pub use tokio_util::sync::CancellationToken;
