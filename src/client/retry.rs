//! Resilient request execution.

use super::backoff::{self, BackoffPolicy};
use super::error::RetryableError;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
pub type RetryHook<E> = Arc<dyn Fn(u32, &E) + Send + Sync>;

/// Per-call retry behaviour.
pub struct RetryOptions<E> {
    /// Overrides the policy's retry limit when set.
    pub retry_limit: Option<u32>,
    /// Replaces [`backoff::is_retryable`] entirely when set.
    pub should_retry: Option<RetryPredicate<E>>,
    /// Called with (attempt, error) before each backoff sleep.
    pub on_retry: Option<RetryHook<E>>,
}

impl<E> RetryOptions<E> {
    pub fn new(retry_limit: u32) -> Self {
        Self {
            retry_limit: Some(retry_limit),
            should_retry: None,
            on_retry: None,
        }
    }

    /// Options that follow the retry limit of `policy`.
    pub fn from_policy(policy: &BackoffPolicy) -> Self {
        Self::new(policy.retry_limit())
    }

    /// Single attempt, for operations that are not safe to repeat.
    pub fn none() -> Self {
        Self::new(0)
    }

    #[must_use]
    pub fn with_predicate(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn with_on_retry(mut self, hook: impl Fn(u32, &E) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }
}

impl<E: RetryableError> RetryOptions<E> {
    /// Effective retry limit under `policy`.
    pub fn limit(&self, policy: &BackoffPolicy) -> u32 {
        self.retry_limit.unwrap_or_else(|| policy.retry_limit())
    }

    fn should_retry(&self, err: &E) -> bool {
        match &self.should_retry {
            Some(predicate) => !err.is_cancelled() && predicate(err),
            None => backoff::is_retryable(err),
        }
    }
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self {
            retry_limit: None,
            should_retry: None,
            on_retry: None,
        }
    }
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            retry_limit: self.retry_limit,
            should_retry: self.should_retry.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("retry_limit", &self.retry_limit)
            .field("should_retry", &self.should_retry.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

/// Run `operation` until it succeeds, fails with a final error, or retries run out.
///
/// The operation is invoked between 1 and `limit + 1` times, where the limit
/// comes from `options` if set and from `policy` otherwise. The error
/// returned is the one produced by the last attempt, untouched. Cancellation
/// is observed while an attempt is in flight and during every backoff sleep;
/// no further attempt starts once the token fires.
pub async fn execute<T, E, F, Fut>(
    policy: &BackoffPolicy,
    options: &RetryOptions<E>,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    E: RetryableError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let limit = options.limit(policy);
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(E::cancelled());
        }

        // Dropping the in-flight future aborts the attempt.
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(E::cancelled()),
            result = operation() => result,
        };
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        // `attempt` counts failures, so the first retry sleeps for attempt 1.
        attempt += 1;
        if attempt > limit || !options.should_retry(&err) {
            if attempt > 1 {
                debug!(attempts = attempt, error = %err, "Giving up");
            }
            return Err(err);
        }

        // The hook may cancel; the select below then returns before sleeping.
        if let Some(hook) = &options.on_retry {
            hook(attempt, &err);
        }

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            "{}, retrying in {}ms (attempt {}/{}): {}",
            backoff::retry_reason(&err).unwrap_or("Request failed"),
            delay.as_millis(),
            attempt,
            limit,
            err
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(E::cancelled()),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
