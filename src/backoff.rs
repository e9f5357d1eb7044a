//! Retry tuning and capped exponential backoff.
//!
//! [`RetryPolicy`] holds every constant the delivery engine consults: the
//! outer and transport retry limits, the backoff curve, and the wall-clock
//! budget. The defaults reproduce the target service's contract exactly;
//! alternate values exist so the state machine can be exercised at other
//! scales.

use crate::error::{DeliveryError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for both retry loops and the delivery budget.
///
/// # Example
///
/// ```
/// use webhook_courier::backoff::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_retries, 5);
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
/// assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(64));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Outer attempts after the first one (429 and 5xx). Default: 5.
    pub max_retries: u32,

    /// Transport retries per outer attempt, for failures before any
    /// response exists. Default: 3.
    pub max_transport_retries: u32,

    /// Delay before the first retry. Default: 1 second.
    #[serde(with = "duration_ms", rename = "base_backoff_ms")]
    pub base_backoff: Duration,

    /// Multiplier applied per attempt. Default: 2.
    pub backoff_base: f64,

    /// Ceiling on any single computed delay. Default: 64 seconds.
    #[serde(with = "duration_ms", rename = "max_backoff_ms")]
    pub max_backoff: Duration,

    /// Wall-clock budget for one delivery, waits included. Default: 5 minutes.
    #[serde(with = "duration_ms", rename = "max_retry_timeout_ms")]
    pub max_retry_timeout: Duration,

    /// Jitter applied to computed delays. Default: none.
    ///
    /// `Retry-After` hints are never jittered.
    pub jitter: JitterStrategy,
}

/// Jitter strategy for spreading out concurrent senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterStrategy {
    /// No jitter. Delay is exactly the calculated value.
    #[default]
    None,

    /// Full jitter: random value in `[0, calculated_delay]`.
    Full,

    /// Equal jitter: `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl RetryPolicy {
    /// The target service's retry contract: 5 retries, 3 transport retries,
    /// 1s doubling up to 64s, 5 minute budget.
    pub fn standard() -> Self {
        Self {
            max_retries: 5,
            max_transport_retries: 3,
            base_backoff: Duration::from_secs(1),
            backoff_base: 2.0,
            max_backoff: Duration::from_secs(64),
            max_retry_timeout: Duration::from_secs(5 * 60),
            jitter: JitterStrategy::None,
        }
    }

    /// Single attempt, no retries of either kind.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            max_transport_retries: 0,
            ..Self::standard()
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_max_transport_retries(mut self, retries: u32) -> Self {
        self.max_transport_retries = retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_max_retry_timeout(mut self, timeout: Duration) -> Self {
        self.max_retry_timeout = timeout;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Reject settings that would make the backoff curve meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.base_backoff.is_zero() {
            return Err(DeliveryError::InvalidConfig(
                "base_backoff must be greater than zero".into(),
            ));
        }
        if self.max_backoff < self.base_backoff {
            return Err(DeliveryError::InvalidConfig(format!(
                "max_backoff ({:?}) is smaller than base_backoff ({:?})",
                self.max_backoff, self.base_backoff
            )));
        }
        if !self.backoff_base.is_finite() || self.backoff_base < 1.0 {
            return Err(DeliveryError::InvalidConfig(format!(
                "backoff_base must be a finite number >= 1, got {}",
                self.backoff_base
            )));
        }
        if self.max_retry_timeout.is_zero() {
            return Err(DeliveryError::InvalidConfig(
                "max_retry_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Delay before retrying after attempt N (0-indexed).
    ///
    /// `base_backoff * backoff_base^attempt`, capped at `max_backoff`, then
    /// jittered according to [`RetryPolicy::jitter`].
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_backoff.as_secs_f64()
            * self.backoff_base.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::try_from_secs_f64(jittered).unwrap_or(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
