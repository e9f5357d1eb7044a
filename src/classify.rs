//! Transient-error classification for transport failures.
//!
//! [`is_transient`] runs an ordered chain of small rules. Each rule either
//! decides (`Some(bool)`) or defers to the next one (`None`):
//!
//! 1. caller cancellation → permanent
//! 2. deadline exceeded → transient
//! 3. timeout or temporary network condition → transient
//! 4. wrapping error → classify its direct cause
//! 5. message contains `connection refused` / `connection reset` → transient
//!
//! Anything no rule claims is permanent.

use crate::error::DeliveryError;
use std::error::Error;
use std::io;

type Rule = fn(&(dyn Error + 'static)) -> Option<bool>;

const RULES: [Rule; 5] = [
    cancelled,
    deadline_exceeded,
    network_timeout_or_temporary,
    wrapped_cause,
    message_fallback,
];

/// Substrings that mark a transient failure when no structured error type
/// is available. Matched case-insensitively.
const TRANSIENT_MESSAGES: [&str; 2] = ["connection refused", "connection reset"];

/// Decide whether a transport error is worth retrying.
///
/// # Example
///
/// ```
/// use webhook_courier::classify::is_transient;
/// use std::io;
///
/// let timeout = io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded");
/// assert!(is_transient(&timeout));
///
/// let dns = io::Error::other("no such host");
/// assert!(!is_transient(&dns));
/// ```
pub fn is_transient(err: &(dyn Error + 'static)) -> bool {
    RULES.iter().find_map(|rule| rule(err)).unwrap_or(false)
}

fn cancelled(err: &(dyn Error + 'static)) -> Option<bool> {
    match err.downcast_ref::<DeliveryError>() {
        Some(DeliveryError::Cancelled { .. }) => Some(false),
        _ => None,
    }
}

fn deadline_exceeded(err: &(dyn Error + 'static)) -> Option<bool> {
    if err.is::<tokio::time::error::Elapsed>() {
        return Some(true);
    }
    match err.downcast_ref::<io::Error>() {
        Some(e) if e.kind() == io::ErrorKind::TimedOut => Some(true),
        _ => None,
    }
}

fn network_timeout_or_temporary(err: &(dyn Error + 'static)) -> Option<bool> {
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        return e.is_timeout().then_some(true);
    }
    if let Some(e) = err.downcast_ref::<io::Error>() {
        return matches!(
            e.kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
        )
        .then_some(true);
    }
    None
}

fn wrapped_cause(err: &(dyn Error + 'static)) -> Option<bool> {
    // io::Error::source() skips the wrapped payload itself, so look at it directly.
    if let Some(inner) = err.downcast_ref::<io::Error>().and_then(|e| e.get_ref()) {
        return Some(is_transient(inner));
    }
    err.source().map(is_transient)
}

fn message_fallback(err: &(dyn Error + 'static)) -> Option<bool> {
    let message = err.to_string().to_ascii_lowercase();
    TRANSIENT_MESSAGES
        .iter()
        .any(|needle| message.contains(needle))
        .then_some(true)
}
