//! Bounded retry with backoff for transient command failures.

use crate::error::{Error, Result};
use std::thread;
use std::time::Duration;

/// How many times to attempt an operation and how long to wait between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each further failure
    pub backoff_factor: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy for `docker pull`: ten attempts, absorbing network start-up races at boot.
    pub fn image_pull() -> Self {
        Self {
            max_attempts: 10,
            ..Default::default()
        }
    }

    /// A policy that attempts `max_attempts` times with no delay between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Calculate the delay after a given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

/// Hooks invoked as [`with_retry`] progresses.
///
/// All methods default to doing nothing.
pub trait RetryCallback {
    /// Called before every attempt.
    ///
    /// # Arguments
    /// * `attempt` - Current attempt number (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    fn on_attempt(&self, _attempt: u32, _max_attempts: u32) {}

    /// Called after a retryable failure when another attempt will follow.
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &Error, _delay: Duration) {}

    /// Called once when every attempt has failed, before the last error is returned.
    fn on_exhausted(&self, _attempts: u32, _error: &Error) {}
}

/// No-op callback.
pub struct NoCallback;

impl RetryCallback for NoCallback {}

/// Execute an operation with retry logic.
///
/// The operation runs until it succeeds, fails with a non-retryable error,
/// or has been attempted `policy.max_attempts` times. On exhaustion the
/// callback's [`RetryCallback::on_exhausted`] runs exactly once and the last
/// error is returned unchanged.
pub fn with_retry<T, F>(
    policy: &RetryPolicy,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let callback = callback.unwrap_or(&NoCallback);
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        callback.on_attempt(attempt, max_attempts);

        let err = match operation() {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !err.is_retryable() {
            return Err(err);
        }

        if attempt >= max_attempts {
            callback.on_exhausted(attempt, &err);
            return Err(err);
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        callback.on_retry(attempt, max_attempts, &err, delay);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        attempt += 1;
    }
}
