// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnection backoff policy.

use std::time::Duration;

/// Exponential backoff: `base * multiplier^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub multiplier: f64,
    pub max: Duration,
    /// Reconnect attempts allowed after a connection is lost.
    pub max_attempts: u32,
}

impl Backoff {
    /// Delay before reconnect attempt number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_ms = self.base.as_millis() as f64;
        let max_ms = self.max.as_millis() as f64;
        let ms = (base_ms * self.multiplier.powi(exp)).min(max_ms);
        Duration::from_millis(ms as u64)
    }

    /// The full delay schedule, one entry per allowed attempt.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).map(|n| self.delay(n))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            base: Duration::from_millis(1000),
            multiplier: 1.5,
            max: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
