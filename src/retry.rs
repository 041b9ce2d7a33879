//! Retry utilities with exponential backoff.
//!
//! Two call sites reuse this module with distinct parameters: the Blob Store
//! Adapter's conditional-append loop (50ms base, ×2, jitter ±25%, up to 8
//! attempts) and the Model Adapter's call retry (250ms base, ×2, jitter ±20%,
//! up to 3 attempts).
//!
//! # Examples
//!
//! ```rust,no_run
//! use transcript_router::retry::{retry_with_backoff, RetryConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RetryConfig::default()
//!     .with_max_attempts(3)
//!     .with_initial_delay(Duration::from_millis(250));
//!
//! let result = retry_with_backoff(config, || async {
//!     Ok::<_, transcript_router::Error>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first, non-retry attempt).
    pub max_attempts: u32,

    /// Initial delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (e.g. 2.0 doubles the delay each time).
    pub backoff_multiplier: f64,

    /// Random jitter applied to the computed delay, as a fraction (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Blob Store Adapter's conditional-append retry parameters (spec §4.1).
    pub fn append_retry(max_attempts: u32) -> Self {
        Self::default()
            .with_max_attempts(max_attempts)
            .with_initial_delay(Duration::from_millis(50))
            .with_backoff_multiplier(2.0)
            .with_jitter_factor(0.25)
    }

    /// Model Adapter's call retry parameters (spec §4.3).
    pub fn model_call() -> Self {
        Self::default()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(250))
            .with_backoff_multiplier(2.0)
            .with_jitter_factor(0.20)
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponential_delay = base_delay_ms * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay = exponential_delay.min(self.max_delay.as_millis() as f64);

        let jitter_range = capped_delay * self.jitter_factor;
        let jitter = rand::random::<f64>() * jitter_range;
        let final_delay = capped_delay + jitter - (jitter_range / 2.0);

        Duration::from_millis(final_delay.max(0.0) as u64)
    }
}

/// Retry an async operation with exponential backoff, retrying every error.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                last_error = Some(err);

                if attempt < config.max_attempts - 1 {
                    let delay = config.calculate_delay(attempt);
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::storage("retry failed with no error")))
}

/// Determine if an error is transient and worth retrying.
///
/// Transport errors and explicit conflict/timeout signals are retryable;
/// configuration and validation-shaped errors (anything the caller sent, not
/// anything the network did) are not.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Http(_) => true,
        Error::Timeout(_) => true,
        Error::Conflict(_) => true,
        Error::Model(msg) => msg.contains("throttled"),
        Error::Config(_) => false,
        Error::Auth(_) => false,
        Error::Oversize(_) => false,
        _ => false,
    }
}

/// Retry an async operation with exponential backoff, only retrying on
/// [`is_retryable_error`].
pub async fn retry_with_backoff_conditional<F, Fut, T>(
    config: RetryConfig,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !is_retryable_error(&err) {
                    return Err(err);
                }

                last_error = Some(err);

                if attempt < config.max_attempts - 1 {
                    let delay = config.calculate_delay(attempt);
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::storage("retry failed with no error")))
}
