// SPDX-FileCopyrightText: 2026 Concord Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capped exponential reconnect delays.

use std::time::Duration;

use concord_config::model::FeedConfig;
use rand::Rng;

/// Reconnect schedule: retry `n` waits `min(base * 2^n, cap)`, spread by jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    /// Reconnect attempts allowed after consecutive failures before giving up.
    pub max_attempts: u32,
    /// Fraction of the delay by which a retry may fire early or late.
    pub jitter_ratio: f64,
}

impl Backoff {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            base: config.base_delay(),
            cap: config.max_delay(),
            max_attempts: config.max_attempts,
            jitter_ratio: config.jitter_ratio,
        }
    }

    /// The un-jittered delay before reconnect `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// The delay before reconnect `attempt` with jitter applied.
    pub fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        let spread = rand::thread_rng().gen_range(-self.jitter_ratio..=self.jitter_ratio);
        delay.mul_f64((1.0 + spread).max(0.0))
    }

    /// Whether `attempt` consecutive failures have used up the schedule.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&FeedConfig::default())
    }
}
