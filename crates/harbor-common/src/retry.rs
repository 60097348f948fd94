//! Bounded retries and timeouts for async work.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::HarborError;

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts. `0` behaves like `1`.
    pub max_attempts: u32,
    /// Wait before the first retry; doubles for each one after.
    pub base_delay: Duration,
    /// Upper bound on any single wait.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Single attempt.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Wait before retry number `retry` (1 = first retry).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or the attempt budget is spent.
///
/// Returns the first success, or the error from the final attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                if max_attempts > 1 {
                    warn!(attempt, error = %e, "Giving up");
                }
                return Err(e);
            }
            Err(e) => {
                let delay = config.backoff(attempt);
                debug!(attempt, max_attempts, ?delay, error = %e, "Attempt failed, retrying");
                sleep(delay).await;
            }
        }
    }
}

/// Bound `operation` by `timeout`.
pub async fn with_timeout<T, F, Fut>(timeout: Duration, operation: F) -> Result<T, HarborError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    tokio::time::timeout(timeout, operation())
        .await
        .map_err(|_| HarborError::Timeout(timeout))
}
