//! Retry policy for lock contention.
//!
//! The default policy waits a fixed second between attempts and gives up
//! after ten retries. Setting `multiplier` above `1.0` turns it into
//! exponential backoff capped at `max_delay`; `jitter` adds up to half of
//! the current delay at random so that simultaneous waiters spread out.

use std::time::Duration;

use rand::Rng;

use crate::locking::{DEFAULT_LOCK_MAX_RETRIES, DEFAULT_LOCK_RETRY_DELAY_MS};

/// Upper bound on a single backoff delay.
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Tunable parameters for lock acquisition retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Total attempts is `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Factor applied to the delay after each failed retry.
    pub multiplier: f64,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Add random jitter of up to half the delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_LOCK_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_LOCK_RETRY_DELAY_MS),
            multiplier: 1.0,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// A fixed-delay policy.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            multiplier: 1.0,
            max_delay: delay.max(DEFAULT_MAX_RETRY_DELAY),
            jitter: false,
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Total number of attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (zero-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        if self.multiplier <= 1.0 {
            return self.initial_delay.min(self.max_delay);
        }
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let ms = self.initial_delay.as_millis() as f64 * factor;
        if !ms.is_finite() || ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(ms as u64)
    }

    /// Delay before retry number `retry` (zero-based), with jitter applied
    /// when enabled.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let spread = (base.as_millis() / 2) as u64;
        if spread == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=spread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fixed_one_second_ten_retries() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries, 10);
        assert_eq!(p.max_attempts(), 11);
        assert_eq!(p.delay_for(0), Duration::from_secs(1));
        assert_eq!(p.delay_for(9), Duration::from_secs(1));
    }

    #[test]
    fn exponential_growth_is_capped() {
        let p = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(1_000),
            jitter: false,
        };
        assert_eq!(p.base_delay(0), Duration::from_millis(100));
        assert_eq!(p.base_delay(1), Duration::from_millis(200));
        assert_eq!(p.base_delay(3), Duration::from_millis(800));
        assert_eq!(p.base_delay(4), Duration::from_millis(1_000));
        assert_eq!(p.base_delay(60), Duration::from_millis(1_000));
    }

    #[test]
    fn jitter_stays_within_half_the_delay() {
        let p = RetryPolicy {
            jitter: true,
            ..RetryPolicy::fixed(3, Duration::from_millis(100))
        };
        for retry in 0..50 {
            let d = p.delay_for(retry);
            assert!(d >= Duration::from_millis(100), "{d:?}");
            assert!(d <= Duration::from_millis(150), "{d:?}");
        }
    }

    #[test]
    fn no_retry_allows_single_attempt() {
        let p = RetryPolicy::no_retry();
        assert_eq!(p.max_attempts(), 1);
        assert_eq!(p.delay_for(0), Duration::ZERO);
    }
}
