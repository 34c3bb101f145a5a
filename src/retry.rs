//! Opt-in retry with exponential backoff and jitter.
//!
//! Nothing in the SDK retries on its own: transport and API errors surface to
//! the caller as-is. Wrap an operation explicitly when retrying makes sense:
//!
//! ```rust,no_run
//! use messages_sdk::retry::{RetryConfig, retry_with_backoff_conditional};
//! use messages_sdk::{Client, Message};
//! use std::time::Duration;
//!
//! # async fn example(client: Client) -> messages_sdk::Result<()> {
//! let config = RetryConfig::new()
//!     .with_max_attempts(4)
//!     .with_initial_delay(Duration::from_millis(500));
//!
//! let response = retry_with_backoff_conditional(config, || {
//!     client.send(vec![Message::user("Hello")])
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! The delay before retry `n` (0-based) is
//! `min(initial_delay * multiplier^n, max_delay)`, spread by up to
//! `jitter_factor` of itself in either direction.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fraction (0.0-1.0) of the delay used as random spread
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
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

    /// Delay to wait after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponential = base_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_millis() as f64);

        let spread = capped * self.jitter_factor;
        let jitter = rand::random::<f64>() * spread - spread / 2.0;

        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

async fn retry_when<F, Fut, T, P>(config: RetryConfig, mut operation: F, should_retry: P) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= attempts || !should_retry(&err) => return Err(err),
            Err(err) => {
                let delay = config.delay_for(attempt);
                log::debug!(
                    "Attempt {}/{} failed ({}); retrying in {:?}",
                    attempt + 1,
                    attempts,
                    err,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retry `operation` on any error.
pub async fn retry_with_backoff<F, Fut, T>(config: RetryConfig, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(config, operation, |_| true).await
}

/// Retry `operation` only on errors for which [`is_retryable_error`] holds.
pub async fn retry_with_backoff_conditional<F, Fut, T>(
    config: RetryConfig,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(config, operation, is_retryable_error).await
}

/// See [`Error::is_retryable`].
pub fn is_retryable_error(error: &Error) -> bool {
    error.is_retryable()
}
