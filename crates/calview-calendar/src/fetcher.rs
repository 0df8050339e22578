//! Rate-limited fetching with exponential backoff.
//!
//! Each attempt first takes a slot from the shared [`RateLimiter`]; a local
//! rejection goes straight to backoff without touching the network. Errors are
//! classified by [`CalendarError::classify`]:
//! - rate limits (local quota or HTTP 429) are retried with backoff
//! - connection failures and 5xx responses are retried only when
//!   `retry_transient` is set
//! - everything else (401, 403, other 4xx, bad payloads) fails immediately
//!
//! Backoff for attempt `n` (1-based) is
//! `min(cap, retry_after * multiplier^(n-1) + jitter)`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use calview_core::RetryConfig;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{CalendarError, ErrorClass, FetchError};
use crate::rate_limit::RateLimiter;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Upper bound for a single wait
    pub backoff_cap: Duration,
    /// Upper bound for the random jitter added to each wait
    pub jitter_max: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Wait used for a 429 without Retry-After
    pub default_retry_after: Duration,
    /// Base wait for transient failures
    pub transient_base_delay: Duration,
    /// Whether transient failures are retried at all
    pub retry_transient: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts.max(1),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
            jitter_max: Duration::from_millis(config.jitter_max_ms),
            multiplier: config.backoff_multiplier,
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
            transient_base_delay: Duration::from_millis(config.transient_base_delay_ms),
            retry_transient: config.retry_transient_errors,
        }
    }

    /// Delay after the `attempt`-th (1-based) failed attempt.
    pub fn delay_for_attempt(&self, base: Duration, attempt: u32, jitter: Duration) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled_ms = base.as_millis() as f64 * self.multiplier.powi(exponent);
        let total_ms = scaled_ms + jitter.as_millis() as f64;
        let capped_ms = total_ms.min(self.backoff_cap.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Uniform random jitter in `[0, jitter_max]`.
    pub fn jitter(&self) -> Duration {
        let max_ms = self.jitter_max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }

    /// Base wait for an error, or `None` if it must not be retried.
    fn base_delay_for(&self, error: &CalendarError) -> Option<Duration> {
        match error.classify() {
            ErrorClass::RateLimit(Some(secs)) => Some(Duration::from_secs(secs)),
            ErrorClass::RateLimit(None) => Some(self.default_retry_after),
            ErrorClass::Transient if self.retry_transient => Some(self.transient_base_delay),
            ErrorClass::Transient | ErrorClass::Fatal => None,
        }
    }
}

/// Progress of one in-flight fetch.
#[derive(Debug)]
pub struct RetryState {
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub last_error: Option<CalendarError>,
}

impl RetryState {
    fn new(max_attempts: u32) -> Self {
        Self {
            attempt_number: 0,
            max_attempts,
            base_delay: Duration::ZERO,
            last_error: None,
        }
    }

    fn is_last_attempt(&self) -> bool {
        self.attempt_number >= self.max_attempts
    }
}

/// Runs operations against the shared rate limiter with retry and backoff.
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self { limiter, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// [`Self::fetch_with_retry`] with the policy's attempt count.
    pub async fn fetch<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CalendarError>>,
    {
        self.fetch_with_retry(self.policy.max_attempts, cancel, operation)
            .await
    }

    /// Execute `operation` with rate limiting and retry.
    ///
    /// Makes at most `max_attempts` attempts (a local quota rejection counts
    /// as one) and waits between them, never after the last one. Cancelling
    /// `cancel` aborts the pending request or backoff timer and returns
    /// [`FetchError::Cancelled`] without consuming further quota.
    ///
    /// # Example
    /// ```ignore
    /// let events = fetcher
    ///     .fetch_with_retry(3, &cancel, || client.list_calendar_view(token, start, end))
    ///     .await?;
    /// ```
    pub async fn fetch_with_retry<T, F, Fut>(
        &self,
        max_attempts: u32,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CalendarError>>,
    {
        let mut state = RetryState::new(max_attempts.max(1));

        loop {
            state.attempt_number += 1;

            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let error = match self.limiter.check_and_consume() {
                Err(exceeded) => CalendarError::RateLimited {
                    retry_after: Some(exceeded.retry_after_secs),
                    local: true,
                },
                Ok(()) => {
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                        result = operation() => result,
                    };
                    match result {
                        Ok(value) => {
                            if state.attempt_number > 1 {
                                tracing::info!(
                                    "Request succeeded on attempt {} of {}",
                                    state.attempt_number,
                                    state.max_attempts
                                );
                            }
                            return Ok(value);
                        }
                        Err(e) => e,
                    }
                }
            };

            let Some(base_delay) = self.policy.base_delay_for(&error) else {
                tracing::debug!("Non-retryable error: {}", error);
                return Err(FetchError::Fatal(error));
            };

            if state.is_last_attempt() {
                tracing::warn!(
                    "All {} attempts exhausted, last error: {}",
                    state.max_attempts,
                    error
                );
                return Err(FetchError::RetryExhausted {
                    attempts: state.attempt_number,
                    last_error: Box::new(error),
                });
            }

            let delay =
                self.policy
                    .delay_for_attempt(base_delay, state.attempt_number, self.policy.jitter());
            tracing::info!(
                "Attempt {} of {} failed ({}), retrying in {:?}",
                state.attempt_number,
                state.max_attempts,
                error,
                delay
            );
            state.base_delay = base_delay;
            state.last_error = Some(error);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
