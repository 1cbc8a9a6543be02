//! Bounded retry with exponential backoff.
//!
//! With the default 5 s base and 3 attempts the schedule is: attempt 1,
//! wait 5 s, attempt 2, wait 10 s, attempt 3, give up. There is no wait
//! after the final attempt.

use crate::config::BatchConfig;
use crate::error::CallError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::warn;

/// How many times a call is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always ≥ 1.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    /// Wait inserted after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. `label` identifies the
    /// call in log lines (document and prompt name).
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, CallError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    warn!("{label}: attempt {attempt} failed permanently — {e}");
                    return Err(e);
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!("{label}: giving up after {attempt} attempts — {e}");
                    return Err(e);
                }
                Err(e) => {
                    let wait = self.delay_after(attempt);
                    warn!(
                        "{label}: attempt {attempt}/{} failed — {e}. Waiting {}s…",
                        self.max_attempts,
                        wait.as_secs_f32()
                    );
                    sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}
