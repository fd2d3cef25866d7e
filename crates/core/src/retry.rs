//! Retry backoff
//!
//! Shared by the write queue and the consistency auditor so both follow the
//! same schedule: `base * 2^(retry_count - 1)`, optionally plus up to half of
//! that as jitter, capped at `max_delay_ms`.
//!
//! The schedule is monotonically non-decreasing even with jitter: the
//! un-jittered delay doubles every step, and jitter never exceeds half of
//! the current step.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Add random jitter to spread retries from many writers
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy without jitter
    pub fn fixed(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter: false,
        }
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between retries
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Un-jittered delay in milliseconds before retry number `retry_count`
    ///
    /// `retry_count` is 1 for the first retry. Zero yields no delay.
    pub fn base_delay_for(&self, retry_count: u32) -> u64 {
        if retry_count == 0 {
            return 0;
        }
        // Cap the shift to prevent overflow (1 << 63 is the max for u64)
        let shift = (retry_count - 1).min(63);
        let multiplier = 1u64 << shift;
        self.base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms)
    }

    /// Delay with a caller-chosen jitter fraction in `[0, 1]`
    ///
    /// A fraction of 1 adds half of the base delay.
    pub fn delay_with_fraction(&self, retry_count: u32, fraction: f64) -> Duration {
        let base = self.base_delay_for(retry_count);
        let jitter = if self.jitter {
            ((base / 2) as f64 * fraction.clamp(0.0, 1.0)) as u64
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter).min(self.max_delay_ms))
    }

    /// Delay before retry number `retry_count`, with random jitter if enabled
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let fraction = if self.jitter {
            rand::thread_rng().gen_range(0.0..=1.0)
        } else {
            0.0
        };
        self.delay_with_fraction(retry_count, fraction)
    }
}
