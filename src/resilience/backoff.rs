//! Reconnect backoff.
//!
//! The delay for the n-th scheduled reconnect (n starting at 0) is
//! `min(base * 2^n, max)` for the exponential strategy and `base` for the
//! fixed one. Only the exponential strategy has an attempt budget.

use std::time::Duration;

use rand::Rng;

use crate::config::{ReconnectConfig, ReconnectStrategy};

/// Calculate the capped exponential delay for a zero-based attempt number.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor).min(max_ms);
    Duration::from_millis(delay_ms)
}

/// Add up to `ratio * delay` of random extra delay.
fn with_jitter(delay: Duration, ratio: f64) -> Duration {
    let jitter_range = (delay.as_millis() as f64 * ratio) as u64;
    if jitter_range == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_range))
}

/// Reconnect policy derived from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    strategy: ReconnectStrategy,
    base_ms: u64,
    max_ms: u64,
    max_attempts: u32,
    jitter_ratio: f64,
}

impl ReconnectPolicy {
    pub fn exponential(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            strategy: ReconnectStrategy::Exponential,
            base_ms: base.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            max_attempts,
            jitter_ratio: 0.0,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            strategy: ReconnectStrategy::Fixed,
            base_ms: ms,
            max_ms: ms,
            max_attempts: u32::MAX,
            jitter_ratio: 0.0,
        }
    }

    pub fn strategy(&self) -> ReconnectStrategy {
        self.strategy
    }

    /// Attempt budget, `None` when reconnects are unbounded.
    pub fn max_attempts(&self) -> Option<u32> {
        match self.strategy {
            ReconnectStrategy::Exponential => Some(self.max_attempts),
            ReconnectStrategy::Fixed => None,
        }
    }

    /// Delay before the next reconnect given how many have already been
    /// scheduled since the last successful connect. `None` means the budget
    /// is spent.
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        let delay = match self.strategy {
            ReconnectStrategy::Exponential => {
                if attempts >= self.max_attempts {
                    return None;
                }
                calculate_backoff(attempts, self.base_ms, self.max_ms)
            }
            ReconnectStrategy::Fixed => Duration::from_millis(self.base_ms),
        };
        Some(with_jitter(delay, self.jitter_ratio))
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            strategy: config.strategy,
            base_ms: config.base_delay_ms,
            max_ms: config.max_delay_ms,
            max_attempts: config.max_attempts,
            jitter_ratio: config.jitter_ratio,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}
