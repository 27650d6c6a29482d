//! Retry eligibility and delay computation.

use super::error::RetryableError;
use rand::Rng;
use std::time::Duration;

/// Upper bound (exclusive) of the random jitter added to each delay, in milliseconds.
pub const MAX_JITTER_MS: u64 = 100;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Exponential backoff with a cap and additive jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    retry_limit: u32,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, retry_limit: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            retry_limit,
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    #[must_use]
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// `min(base * 2^(attempt - 1), max)`. Attempt 0 yields half the base delay.
    pub fn delay_without_jitter(&self, attempt: u32) -> Duration {
        let base = millis(self.base_delay);
        let max = millis(self.max_delay);
        let raw = if attempt == 0 {
            base / 2
        } else {
            let shift = (attempt - 1).min(32);
            base.saturating_mul(1_u64 << shift)
        };
        Duration::from_millis(raw.min(max))
    }

    /// Delay before the retry following failed `attempt`, jitter included.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = rand::rng().random_range(0..MAX_JITTER_MS);
        self.delay_without_jitter(attempt) + Duration::from_millis(jitter)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_RETRY_LIMIT)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Default retry predicate.
///
/// Client errors (4xx) are final except 408 and 429. Everything else,
/// including errors without a status, is worth another attempt. Cancellation
/// is never retried.
pub fn is_retryable<E: RetryableError>(err: &E) -> bool {
    if err.is_cancelled() {
        return false;
    }
    match err.status() {
        Some(408 | 429) => true,
        Some(status) => !(400..500).contains(&status),
        None => true,
    }
}

/// Classify a retryable error for logging, returning `None` if it is final.
pub fn retry_reason<E: RetryableError>(err: &E) -> Option<&'static str> {
    if !is_retryable(err) {
        return None;
    }
    Some(match err.status() {
        Some(429) => "Rate limited",
        Some(408) => "Request timed out",
        Some(_) => "Server error",
        None => "Network error",
    })
}
