//! Retry classification and exponential backoff
//!
//! The queue never retries inline. A failed attempt is classified through
//! [`IsRetryable`]; if it may be retried and attempts remain, the request goes
//! back to the queue with a delay from [`next_delay`]. Delays grow
//! exponentially, are capped at `max_delay`, optionally jittered, and never
//! shrink between consecutive attempts of the same request.
//!
//! # Example
//!
//! ```
//! use media_queue::config::RetryConfig;
//! use media_queue::retry::{IsRetryable, next_delay, should_retry};
//! use media_queue::FetchError;
//! use std::time::Duration;
//!
//! let config = RetryConfig { jitter: false, ..RetryConfig::default() };
//! let err = FetchError::transient("HTTP Error 503");
//! assert!(err.is_retryable());
//! assert!(should_retry(&config, &err, 1));
//! assert_eq!(next_delay(&config, 1, None), Duration::from_secs(2));
//! assert_eq!(next_delay(&config, 2, None), Duration::from_secs(4));
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, FailureKind, FetchError};
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network hiccups, platform throttling, timeouts) should return `true`.
/// Permanent failures (removed content, unsupported URL, policy violation) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FailureKind {
    fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transient | FailureKind::Timeout)
    }
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Fetch(e) => e.is_retryable(),
            // I/O errors can be retryable in some cases
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            // Admission decisions are answered to the caller, never retried internally
            Error::Rejected(_) => false,
            Error::Download(_) => false,
            Error::Database(_) | Error::Sqlx(_) => false,
            Error::Config { .. } => false,
            Error::NotFound(_) => false,
            Error::Serialization(_) => false,
            Error::ApiServerError(_) => false,
            Error::NotSupported(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// Whether a request whose attempt number `attempts_made` just failed with `error` goes back to the queue
pub fn should_retry<E: IsRetryable>(config: &RetryConfig, error: &E, attempts_made: u32) -> bool {
    error.is_retryable() && attempts_made < config.max_attempts
}

/// Un-jittered delay after the given failed attempt (1-based)
///
/// `initial_delay * backoff_multiplier^(attempt - 1)`, capped at `max_delay`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    if !secs.is_finite() || secs >= config.max_delay.as_secs_f64() {
        return config.max_delay;
    }
    Duration::from_secs_f64(secs)
}

/// Delay before retrying after the given failed attempt (1-based)
///
/// Applies jitter when enabled and keeps the result no smaller than
/// `previous`, the delay used before this attempt.
pub fn next_delay(config: &RetryConfig, attempt: u32, previous: Option<Duration>) -> Duration {
    let base = backoff_delay(config, attempt);
    let delay = if config.jitter {
        add_jitter(base).min(config.max_delay.max(base))
    } else {
        base
    };
    match previous {
        Some(prev) => delay.max(prev),
        None => delay,
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::try_from_secs_f64(jittered_secs).unwrap_or(Duration::MAX)
}
