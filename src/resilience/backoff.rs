//! # Backoff Policy
//!
//! Exponential backoff with a cap and a bounded attempt count. Shared by the
//! drive client's request retries and the copy-status poll, so neither can
//! loop forever.

use crate::config::{CopyPollConfig, StorageConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Total attempts including the first; always at least 1
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration, multiplier: f64, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            multiplier: multiplier.max(1.0),
            max_attempts: max_attempts.max(1),
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1.0, max_attempts)
    }

    /// Delay to wait after the given zero-based attempt failed
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let millis = (self.initial.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// All delays between consecutive attempts
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(move |attempt| self.delay_for(attempt))
    }
}

impl From<&CopyPollConfig> for BackoffPolicy {
    fn from(config: &CopyPollConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_interval_ms),
            Duration::from_millis(config.max_interval_ms),
            config.multiplier,
            config.max_attempts,
        )
    }
}

impl From<&StorageConfig> for BackoffPolicy {
    /// Request retries: `max_retries` retries after the first attempt, doubling
    /// from `retry_base_delay_ms`
    fn from(config: &StorageConfig) -> Self {
        let base = Duration::from_millis(config.retry_base_delay_ms);
        Self::new(
            base,
            base.saturating_mul(1 << config.max_retries.min(16)),
            2.0,
            config.max_retries.saturating_add(1),
        )
    }
}
