//! Backoff for remote price lookups
//!
//! The Price List API throttles aggressively; transient failures are
//! retried with jittered exponential delays before the resolver falls
//! through to its fallback tier.

use crate::error::{IsRetryable, Result, TcoError};
use std::time::Duration;
use tracing::{info, warn};

/// How a remote pricing call is re-attempted
#[allow(async_fn_in_trait)]
pub trait RetryPolicy: Send + Sync {
    /// Run `f` until it succeeds, fails permanently or attempts run out
    async fn execute_with_retry<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<T>> + Send;
}

/// Doubling delay per attempt, capped, with up to 10% jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoffPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl ExponentialBackoffPolicy {
    /// `max_attempts` counts the first call; 0 is treated as 1
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
        }
    }

    /// Three attempts, 100ms first delay
    pub fn default_policy() -> Self {
        Self::new(3)
    }

    /// Policy for the AWS Price List API (5 attempts)
    pub fn for_pricing_api() -> Self {
        Self::new(5)
    }

    /// Override the first backoff delay (doubles on every attempt)
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Cap for a single backoff delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sleep before retry number `attempt + 1`
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * 2f64.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        // Jitter keeps parallel VM lookups from retrying in lockstep
        let jitter = capped * self.jitter_factor * fastrand::f64();
        Duration::from_millis((capped + jitter) as u64)
    }
}

impl Default for ExponentialBackoffPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    async fn execute_with_retry<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<T>> + Send,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("Pricing call succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    if attempt + 1 >= self.max_attempts {
                        warn!("Max retries ({}) reached: {}", self.max_attempts, e);
                        return Err(TcoError::Retryable {
                            attempt: attempt + 1,
                            max_attempts: self.max_attempts,
                            reason: e.to_string(),
                            source: Some(Box::new(e)),
                        });
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        "Retryable error (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
