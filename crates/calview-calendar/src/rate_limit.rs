//! Client-side request quota for the Graph API.
//!
//! One [`RateLimiter`] exists per API client and is shared by `Arc` with every
//! fetcher that talks to that API. Time comes from [`tokio::time::Instant`],
//! so tests can pause and advance the clock.

use std::time::Duration;

use calview_core::RateLimitConfig;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

/// Local quota exhausted for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Rate limit exceeded, retry after {retry_after_secs} seconds")]
pub struct RateLimitExceeded {
    /// Time left in the window, rounded up to whole seconds.
    pub retry_after_secs: u64,
}

/// Counters for the current window.
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub window_start: Instant,
    pub request_count: u32,
    pub max_requests: u32,
    pub window_duration: Duration,
    pub last_request: Option<Instant>,
}

impl RateWindow {
    fn new(max_requests: u32, window_duration: Duration) -> Self {
        Self {
            window_start: Instant::now(),
            request_count: 0,
            max_requests,
            window_duration,
            last_request: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window_duration
    }
}

/// Fixed-window request quota.
///
/// Create one per API client and share it by `Arc`; every caller draws from
/// the same window.
#[derive(Debug)]
pub struct RateLimiter {
    window: Mutex<RateWindow>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_duration: Duration) -> Self {
        Self {
            window: Mutex::new(RateWindow::new(max_requests, window_duration)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_requests_per_window,
            Duration::from_millis(config.window_duration_ms),
        )
    }

    /// Take one request from the quota, or report how long until the window resets.
    ///
    /// The check and the increment happen under one lock with no await in
    /// between, so two interleaved callers can never both take the last slot.
    pub fn check_and_consume(&self) -> Result<(), RateLimitExceeded> {
        let now = Instant::now();
        let mut window = self.window.lock();

        if window.is_expired(now) {
            window.window_start = now;
            window.request_count = 0;
        }

        if window.request_count >= window.max_requests {
            let elapsed = now.saturating_duration_since(window.window_start);
            let remaining = window.window_duration.saturating_sub(elapsed);
            let retry_after_secs = remaining.as_millis().div_ceil(1000) as u64;
            tracing::debug!(
                count = window.request_count,
                max = window.max_requests,
                retry_after_secs,
                "Local rate limit reached"
            );
            return Err(RateLimitExceeded { retry_after_secs });
        }

        window.request_count += 1;
        window.last_request = Some(now);
        Ok(())
    }

    /// Requests still allowed in the current window.
    pub fn remaining(&self) -> u32 {
        let window = self.window.lock();
        if window.is_expired(Instant::now()) {
            window.max_requests
        } else {
            window.max_requests.saturating_sub(window.request_count)
        }
    }

    /// Copy of the current window counters, for diagnostics and tests.
    pub fn snapshot(&self) -> RateWindow {
        *self.window.lock()
    }
}
