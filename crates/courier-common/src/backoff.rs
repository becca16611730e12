//! Bounded exponential backoff with jitter
//!
//! Used by the gateway between reconnect attempts and by the REST dispatcher between
//! retries. Jitter keeps many shards or workers from retrying in lockstep.

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Backoff calculator
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay before the next attempt; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Delay for a given attempt number without touching the counter
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.base_ms as f64;
        let max = self.config.max_ms.max(self.config.base_ms) as f64;

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let capped = (base * self.config.multiplier.max(1.0).powi(exponent)).min(max);

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let jittered = if jitter > 0.0 {
            let spread = capped * jitter;
            capped + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            capped
        };

        Duration::from_millis(jittered.clamp(base / 2.0, max) as u64)
    }

    /// Forget previous failures
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}
