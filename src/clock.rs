//! Time abstraction for backoff waits and the delivery budget.
//!
//! The engine never calls `tokio::time::sleep` or `Instant::now` directly.
//! Production code uses [`SystemClock`]; tests use [`MockClock`], which
//! advances a virtual clock instantly and records every requested sleep.
//!
//! # Example
//!
//! ```
//! use webhook_courier::clock::{Clock, MockClock};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let clock = MockClock::new();
//! let before = clock.now();
//! clock.sleep(Duration::from_secs(4)).await;
//! assert_eq!(clock.now() - before, Duration::from_secs(4));
//! assert_eq!(clock.sleeps(), vec![Duration::from_secs(4)]);
//! # });
//! ```

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Source of time and waiting.
///
/// Both operations must agree: after `sleep(d)` completes, `now()` must have
/// advanced by at least `d`.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant, used to measure elapsed delivery time.
    fn now(&self) -> Instant;

    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock for deterministic tests.
///
/// `sleep` returns immediately, moves the virtual time forward, and appends
/// the duration to a log that tests can inspect with [`MockClock::sleeps`].
#[derive(Debug)]
pub struct MockClock {
    origin: Instant,
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl MockClock {
    /// Create a virtual clock starting at the current real instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Move virtual time forward without recording a sleep.
    ///
    /// Use this to simulate time spent inside HTTP calls.
    pub fn advance(&self, by: Duration) {
        self.lock().elapsed += by;
    }

    /// Every duration passed to [`Clock::sleep`], in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Total virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded sleeps.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}
