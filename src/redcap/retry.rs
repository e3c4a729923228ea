//! Bounded retry with jittered exponential backoff.
//!
//! A whole subject is retried, not an individual request: a half-synced
//! subject resumes from its first project, and snapshots already written on
//! an earlier attempt compare equal and are left alone.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::Error;

/// How many times, and how patiently, to retry a failing operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Up to this fraction of each delay is added at random
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_attempts(5)
    }
}

impl RetryPolicy {
    /// Default backoff (1s doubling to 30s, 25% jitter) with a custom
    /// attempt ceiling.
    #[must_use]
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
            jitter: 0.25,
        }
    }

    /// Retry without sleeping between attempts.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
            jitter: 0.0,
        }
    }

    /// Delay before attempt `attempt + 1`, given that `attempt` attempts
    /// (1-based) have failed. Jitter excluded.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        base.mul_f64(1.0 + extra)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts `policy.max_attempts`. The last error is returned.
///
/// # Errors
///
/// Returns the operation's error as described above.
pub async fn retry<F, Fut, T>(operation_name: &str, policy: &RetryPolicy, mut operation: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(val) => {
                if attempt > 1 {
                    info!("{operation_name} succeeded on attempt {attempt}");
                }
                return Ok(val);
            }
            Err(err) if !err.is_retryable() || attempt >= policy.max_attempts => {
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay(attempt);
                warn!(
                    "{operation_name} failed (attempt {attempt}/{}): {err}. Retrying in {delay:?}",
                    policy.max_attempts
                );
                sleep(delay).await;
            }
        }
    }
}
