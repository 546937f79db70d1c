//! Poll delay schedule.

use std::time::Duration;

use evolf_common::PollingConfig;

/// Delay `k` (0-based) is `min(floor(initial × multiplier^k), max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(40_000),
            max: Duration::from_millis(900_000),
            multiplier: 1.5,
        }
    }
}

impl From<&PollingConfig> for BackoffPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            initial: config.initial_interval(),
            max: config.max_interval(),
            multiplier: config.multiplier,
        }
    }
}

impl BackoffPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial.as_millis() as f64;
        let max_ms = self.max.as_millis() as f64;
        let exp = attempt.min(i32::MAX as u32) as i32;
        let raw = initial_ms * self.multiplier.powi(exp);
        let ms = if raw.is_finite() { raw.floor().min(max_ms) } else { max_ms };
        Duration::from_millis(ms as u64)
    }

    /// The infinite sequence of delays, starting at attempt 0.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0u32..).map(move |k| self.delay(k))
    }
}
