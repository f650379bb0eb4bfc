//! # Backoff Calculator
//!
//! Exponential backoff for retry recovery actions:
//! `delay = min(base * multiplier^attempt, max_delay) + jitter`, where jitter is a
//! random fraction (up to `jitter_factor`) of the capped delay.

use crate::config::RecoveryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for backoff calculation behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Maximum jitter as a fraction of the capped delay (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::from(&RecoveryConfig::default())
    }
}

impl From<&RecoveryConfig> for BackoffConfig {
    fn from(config: &RecoveryConfig) -> Self {
        Self {
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            multiplier: config.backoff_multiplier,
            jitter_factor: config.jitter_factor,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Capped exponential delay for a zero-based attempt number, without jitter
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let factor = self.config.multiplier.powi(exponent);
        let uncapped = self.config.base_delay.as_secs_f64() * factor;
        if !uncapped.is_finite() || uncapped >= self.config.max_delay.as_secs_f64() {
            self.config.max_delay
        } else {
            Duration::from_secs_f64(uncapped)
        }
    }

    /// Delay to wait before the given zero-based attempt, jitter included
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let capped = self.base_delay_for_attempt(attempt);
        if self.config.jitter_factor > 0.0 {
            capped + capped.mul_f64(fastrand::f64() * self.config.jitter_factor)
        } else {
            capped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator(jitter: f64) -> BackoffCalculator {
        BackoffCalculator::new(BackoffConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_factor: jitter,
        })
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let calc = calculator(0.0);
        assert_eq!(calc.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(calc.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(calc.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(calc.delay_for_attempt(4), Duration::from_secs(1));
        assert_eq!(calc.delay_for_attempt(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let calc = calculator(0.5);
        for attempt in 0..6 {
            let capped = calc.base_delay_for_attempt(attempt);
            let delay = calc.delay_for_attempt(attempt);
            assert!(delay >= capped);
            assert!(delay <= capped.mul_f64(1.5));
        }
    }
}
