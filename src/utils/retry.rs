//! Exponential backoff for embedding and vector store calls.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts in total, never less than one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1).with_initial_delay(Duration::ZERO)
    }

    /// Pause after the `failed`-th failed attempt (1-based), capped at `max_delay`.
    pub fn delay_for(&self, failed: u32) -> Duration {
        let factor = self.multiplier.powi(failed.saturating_sub(1) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        }
    }
}

#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Carries the error of the last attempt.
    Failed { last_error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed { last_error, .. } => Err(last_error),
        }
    }
}

pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Run `operation` until it succeeds, hits a permanent error, or attempts run out.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        let error = match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(error) => error,
        };

        if attempts >= config.max_attempts || !error.is_retryable() {
            return RetryResult::Failed {
                last_error: error,
                attempts,
            };
        }

        let delay = config.delay_for(attempts);
        debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, %error, "retrying");
        sleep(delay).await;
    }
}
