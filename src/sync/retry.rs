//! Retry policy for page fetches.
//!
//! Implements exponential backoff with configurable parameters.

use crate::config::SyncJobSettings;
use crate::feed::FeedError;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Granularity at which a backoff wait notices cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Cap for exponential growth.
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(config: &SyncJobSettings) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// A policy that gives up on the first failure.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// `initial_backoff * multiplier^retry_count`, capped at `max_backoff_ms`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let backoff =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(retry_count as i32);
        Duration::from_millis(backoff.min(self.max_backoff_ms as f64) as u64)
    }

    pub fn should_retry(&self, error: &FeedError, retry_count: u32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }

    /// Runs `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// Sleeps on the calling thread between attempts; callers are expected
    /// to be on a blocking thread. A cancelled token, also mid-wait, stops
    /// further attempts and returns the last error.
    pub fn run<T, F>(&self, cancel: &CancellationToken, what: &str, mut op: F) -> Result<T, FeedError>
    where
        F: FnMut() -> Result<T, FeedError>,
    {
        let mut retry_count = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if self.should_retry(&e, retry_count) && !cancel.is_cancelled() => {
                    let wait = self.backoff(retry_count);
                    retry_count += 1;
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        what, e, retry_count, self.max_retries, wait
                    );
                    if !sleep_unless_cancelled(cancel, wait) {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Returns false if `cancel` fired before `wait` elapsed.
fn sleep_unless_cancelled(cancel: &CancellationToken, wait: Duration) -> bool {
    let deadline = Instant::now() + wait;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        std::thread::sleep(remaining.min(CANCEL_POLL_INTERVAL));
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}
