use std::future::Future;
use std::time::Duration;

use crate::error::AppResult;

/// Fixed-delay, bounded retry shared by the search client and the PDF fetcher.
/// Only errors reporting `is_retryable()` (HTTP 502) are attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_secs(2) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), delay }
    }

    /// Runs `attempt` until it succeeds, fails terminally, or the attempt
    /// budget is spent. The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> AppResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut n = 1;
        loop {
            match attempt(n).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && n < self.max_attempts => {
                    tracing::warn!(
                        "{}: {} (attempt {}/{}), retrying in {:?}",
                        label,
                        e,
                        n,
                        self.max_attempts,
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    n += 1;
                }
                Err(e) => {
                    tracing::error!("{}: giving up after {} attempt(s): {}", label, n, e);
                    return Err(e);
                }
            }
        }
    }
}
