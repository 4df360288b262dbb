//! Bounded exponential retry around backend calls

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Retry policy with capped exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    retry_count: u32,
    min_wait: Duration,
    max_wait: Duration,
    backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 3,
            min_wait: Duration::from_secs(5),
            max_wait: Duration::from_secs(15),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(retry_count: u32) -> Self {
        Self {
            retry_count,
            ..Default::default()
        }
    }

    pub fn with_min_wait(mut self, wait: Duration) -> Self {
        self.min_wait = wait;
        self
    }

    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_count + 1
    }

    /// Wait before retry number `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay =
            self.min_wait.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = delay.min(self.max_wait.as_millis() as f64) as u64;

        Duration::from_millis(delay_ms)
    }

    /// Runs `operation` until `should_retry` rejects its result or attempts run out.
    /// The last result is returned either way.
    pub async fn run<T, E, F, Fut, R>(&self, mut operation: F, should_retry: R) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&Result<T, E>) -> bool,
    {
        let mut attempt = 0;

        loop {
            let result = operation().await;

            if attempt >= self.retry_count || !should_retry(&result) {
                return result;
            }

            let delay = self.delay_for_attempt(attempt);
            debug!(
                attempt = attempt + 1,
                max_attempts = self.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                "Retrying backend call"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
