// core/src/config.rs

//! Tunables for the marketplace services.

use std::time::Duration;

/// How transactional operations retry after an optimistic-concurrency conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
  /// Total attempts, including the first one. Zero is treated as one.
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
  pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_millis(25),
      max_delay: Duration::from_secs(1),
      backoff_multiplier: 2.0,
    }
  }
}

impl RetryConfig {
  /// A config that never waits between attempts. Handy for tests.
  pub fn immediate(max_attempts: u32) -> Self {
    Self {
      max_attempts,
      base_delay: Duration::ZERO,
      max_delay: Duration::ZERO,
      backoff_multiplier: 1.0,
    }
  }

  pub(crate) fn attempts(&self) -> u32 {
    self.max_attempts.max(1)
  }

  /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
  pub fn delay_after(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16) as i32;
    let millis = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
    let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
    Duration::from_millis(capped as u64)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
  pub checkout: RetryConfig,
  /// Used by single-document read-modify-write operations (status changes, cart edits, restocks).
  pub order_updates: RetryConfig,
  /// Upper bound on orders replayed when a fanout subscription (re)synchronises.
  pub fanout_resync_limit: usize,
}

impl Default for MarketConfig {
  fn default() -> Self {
    Self {
      checkout: RetryConfig::default(),
      order_updates: RetryConfig::default(),
      fanout_resync_limit: 500,
    }
  }
}
