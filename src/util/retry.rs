//! Retry budget for platform calls: exponential backoff with full jitter.
//!
//! Only transient failures spend the budget. Quota and authorization signals
//! end the call on the first response.
use std::time::Duration;

use rand::Rng;

use super::error::is_retryable;
use crate::clients::PlatformError;

/// How many times a failed call may be repeated, and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt; `0` sends each request once.
    pub max_retries: usize,
    pub base_delay_ms: u64,
    /// Ceiling for a single backoff.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3, 250, 10_000)
    }
}

impl RetryConfig {
    #[must_use]
    pub const fn new(max_retries: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Requests sent at most for one call.
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Upper bound of the jittered wait before the `retry`-th retry (1-based).
    #[must_use]
    pub fn backoff_ceiling(&self, retry: usize) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let shift = u32::try_from(retry - 1).unwrap_or(u32::MAX);
        let factor = 1_u64.checked_shl(shift).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }

    /// Wait before the next attempt, or `None` when `error` ends the call.
    ///
    /// `retries_done` counts retries already spent on this call.
    #[must_use]
    pub fn next_delay(&self, error: &PlatformError, retries_done: usize) -> Option<Duration> {
        if !is_retryable(error) || retries_done >= self.max_retries {
            return None;
        }
        let ceiling = u64::try_from(self.backoff_ceiling(retries_done + 1).as_millis()).unwrap_or(u64::MAX);
        let jittered = if ceiling > 0 {
            rand::rng().random_range(0..=ceiling)
        } else {
            0
        };
        Some(Duration::from_millis(jittered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable() -> PlatformError {
        PlatformError::Status {
            status: 503,
            body: "unavailable".into(),
        }
    }

    #[test]
    fn ceiling_doubles_until_capped() {
        let config = RetryConfig::new(10, 100, 500);

        assert_eq!(config.backoff_ceiling(0), Duration::ZERO);
        assert_eq!(config.backoff_ceiling(1), Duration::from_millis(100));
        assert_eq!(config.backoff_ceiling(3), Duration::from_millis(400));
        assert_eq!(config.backoff_ceiling(4), Duration::from_millis(500));
        assert_eq!(config.backoff_ceiling(90), Duration::from_millis(500));
    }

    #[test]
    fn transient_failures_spend_the_whole_budget() {
        let config = RetryConfig::new(3, 100, 1000);
        let error = unavailable();

        assert_eq!(config.max_attempts(), 4);
        for done in 0..3 {
            let delay = config.next_delay(&error, done).expect("retry allowed");
            assert!(delay <= config.backoff_ceiling(done + 1));
        }
        assert!(config.next_delay(&error, 3).is_none());
    }

    #[test]
    fn terminal_failures_are_never_retried() {
        let config = RetryConfig::default();

        assert!(config.next_delay(&PlatformError::QuotaExceeded("daily".into()), 0).is_none());
        assert!(config.next_delay(&PlatformError::Decode("eof".into()), 0).is_none());
    }

    #[test]
    fn zero_retries_sends_once() {
        let config = RetryConfig::new(0, 100, 1000);
        assert_eq!(config.max_attempts(), 1);
        assert!(config.next_delay(&unavailable(), 0).is_none());
    }

    #[test]
    fn zero_base_delay_retries_immediately() {
        let config = RetryConfig::new(3, 0, 0);
        assert_eq!(config.next_delay(&unavailable(), 1), Some(Duration::ZERO));
    }
}
