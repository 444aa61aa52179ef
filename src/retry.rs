use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::config::RetrySettings;
use crate::error::AppError;

/// Caller-side exponential backoff. The delivery client never retries on
/// its own; callers that want retries wrap a call in [`RetryPolicy::run`].
/// Only errors that [`AppError::is_retryable`] accepts are tried again.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: settings.initial_delay,
            backoff_multiplier: settings.backoff_multiplier,
            max_delay: settings.max_delay,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped as u64)
    }

    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() || attempt >= self.max_attempts => {
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
