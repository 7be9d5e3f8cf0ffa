//! Retry policy for transient failures with exponential backoff
//!
//! This module holds the backoff math and the transient-failure classification
//! shared by every call made through the resilient transport. Rate-limit
//! waits are handled separately and never consume this budget.

use crate::config::RetryConfig;
use crate::error::{RetryableError, TransportError};
use rand::Rng;
use std::time::Duration;

/// Retry policy with exponential backoff support
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new RetryPolicy with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a RetryPolicy with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Decide whether a failed attempt should be retried
    ///
    /// `attempt` is the number of retries already performed. `max_retries`
    /// overrides the configured ceiling for a single endpoint when set.
    ///
    /// # Returns
    ///
    /// The delay to sleep before the next attempt, or `None` when the error is
    /// permanent or the budget is spent.
    pub fn next_delay(
        &self,
        err: &TransportError,
        attempt: u32,
        max_retries: Option<u32>,
    ) -> Option<Duration> {
        let max_retries = max_retries.unwrap_or(self.config.max_retries);
        if attempt >= max_retries || !self.is_transient(err) {
            return None;
        }
        Some(self.calculate_backoff(attempt))
    }

    /// Check whether an error is transient under this policy
    ///
    /// Server errors are transient only when their status is listed in
    /// `retry_on_status`.
    pub fn is_transient(&self, err: &TransportError) -> bool {
        match err {
            TransportError::ServerError(status) => self.config.retry_on_status.contains(status),
            other => other.is_retryable(),
        }
    }

    /// Calculate backoff duration for a given attempt number
    ///
    /// Uses exponential backoff: `initial_backoff * multiplier^attempt`, plus
    /// `random(0, initial_backoff)` when jitter is enabled, capped at
    /// `max_backoff_ms`.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let initial = self.config.initial_backoff_ms as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let mut delay = initial * self.config.backoff_multiplier.powi(exponent);

        if self.config.jitter && initial > 0.0 {
            delay += rand::thread_rng().gen_range(0.0..initial);
        }

        let capped = delay.min(self.config.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
