//! Retry policy for per-task fetch attempts.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use super::error::{FetchError, FetchResult};

/// Default maximum attempts per task (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Default cap on any single delay.
pub const DEFAULT_MAX_DELAY_SECS: u64 = 10;

/// Default multiplier applied after each failure.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default upper bound of the random jitter added to each delay.
pub const DEFAULT_MAX_JITTER_MS: u64 = 500;

/// Exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial one).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay cap (delay won't exceed this, jitter included).
    pub max_delay: Duration,
    /// Multiplier applied to delay after each failure.
    pub multiplier: f64,
    /// Upper bound of the uniformly random jitter.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: Duration::from_millis(DEFAULT_MAX_JITTER_MS),
        }
    }
}

impl RetryPolicy {
    /// Policy with no delays, for tests and local mirrors.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            max_jitter: Duration::ZERO,
        }
    }

    /// Set the maximum attempts (builder pattern).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Calculates the base delay for a given attempt number, without jitter.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The attempt that just failed (1-based)
    ///
    /// # Returns
    ///
    /// The delay to wait before the next attempt, or `None` if no more
    /// attempts are allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.powi((attempt - 1) as i32);
        let delay_ms = self.initial_delay.as_millis() as f64 * factor;
        let capped = delay_ms.min(self.max_delay.as_millis() as f64) as u64;
        Some(Duration::from_millis(capped))
    }

    /// Delay before the next attempt with random jitter added, capped at
    /// `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Option<Duration> {
        let base = self.delay_for_attempt(attempt)?;
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        Some((base + jitter).min(self.max_delay))
    }

    /// Run `operation` until it succeeds, fails permanently or exhausts
    /// `max_attempts`, sleeping [`backoff`](Self::backoff) between attempts.
    ///
    /// Only transient errors are retried. Cancellation during a backoff
    /// returns [`FetchError::Cancelled`].
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> FetchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let delay = if error.is_transient() {
                self.backoff(attempt)
            } else {
                None
            };
            let Some(delay) = delay else {
                return Err(error);
            };

            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after backoff"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
