use std::time::Duration;

use crate::config::WorkerSettings;

/// Exponential backoff between task retries.
///
/// Retry `n` (1-based) waits `base * 2^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self::new(
            settings.max_retries,
            Duration::from_millis(settings.retry_base_milliseconds),
            Duration::from_secs(settings.retry_max_secs),
        )
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&WorkerSettings::default())
    }
}
