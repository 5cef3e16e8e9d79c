use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Retry delays growing as `base * factor^(attempt - 1)`, capped at `max`, each scaled by a
/// random factor in `[1 - jitter, 1 + jitter]`. Yields at most `max_attempts` delays.
#[derive(Debug, Clone)]
pub(crate) struct Exponential {
    base_interval: Duration,
    max_interval: Duration,
    factor: f64,
    jitter: f64,
    max_attempts: u16,
    current_attempt: u16,
}

impl Exponential {
    pub(crate) fn new(
        base_interval: Duration,
        max_interval: Duration,
        factor: f64,
        jitter: f64,
        max_attempts: u16,
    ) -> Self {
        Self {
            base_interval,
            max_interval,
            factor,
            jitter: jitter.clamp(0.0, 1.0),
            max_attempts,
            current_attempt: 0,
        }
    }

    fn delay(&self, attempt: u16) -> Duration {
        let exponent = i32::from(attempt.max(1) - 1);
        let base_ms = self.base_interval.as_millis() as f64 * self.factor.powi(exponent);

        let delay_ms = if self.jitter == 0.0 {
            base_ms
        } else {
            base_ms * rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter)
        };
        Duration::from_millis(delay_ms as u64).min(self.max_interval)
    }
}

impl From<&RetryConfig> for Exponential {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(u64::from(config.initial_retry_interval_in_ms)),
            Duration::from_millis(u64::from(config.max_retry_interval_in_ms)),
            config.retry_factor,
            config.retry_jitter,
            config.max_retry_attempts,
        )
    }
}

impl Iterator for Exponential {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }
        self.current_attempt += 1;
        Some(self.delay(self.current_attempt))
    }
}
