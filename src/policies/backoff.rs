//! # Backoff policy for retrying events.
//!
//! [`BackoffPolicy`] controls how long an escalated failure waits before it is
//! re-enqueued. The delay before retry `n` (1-based) is `first × factor^(n-1)`,
//! clamped to `max`, then jitter is applied. With the defaults this yields
//! 1s, 2s, 4s, … for the first, second, third retry.
//!
//! The base delay depends only on the retry number, so jitter never feeds back
//! into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use eventvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(200));
//! assert_eq!(backoff.delay(11), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound of any single delay.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(300),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (1-based; `0` is treated as `1`).
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling(first_ms: u64, max: Duration) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max,
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn default_doubles_from_one_second() {
        let p = BackoffPolicy::default();
        assert_eq!(p.delay(1), Duration::from_secs(1));
        assert_eq!(p.delay(2), Duration::from_secs(2));
        assert_eq!(p.delay(3), Duration::from_secs(4));
    }

    #[test]
    fn retry_zero_behaves_like_first_retry() {
        let p = doubling(250, Duration::from_secs(30));
        assert_eq!(p.delay(0), p.delay(1));
    }

    #[test]
    fn delays_are_capped() {
        let p = doubling(100, Duration::from_secs(1));
        assert_eq!(p.delay(5), Duration::from_millis(1600).min(Duration::from_secs(1)));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn first_above_max_is_clamped() {
        let p = doubling(10_000, Duration::from_secs(5));
        assert_eq!(p.delay(1), Duration::from_secs(5));
    }

    #[test]
    fn equal_jitter_stays_within_half_and_base() {
        let p = BackoffPolicy {
            jitter: JitterPolicy::Equal,
            ..doubling(100, Duration::from_secs(30))
        };
        for retry in 1..12 {
            let base = (100u64 << (retry - 1)).min(30_000);
            let d = p.delay(retry);
            assert!(d >= Duration::from_millis(base / 2), "retry {retry}: {d:?}");
            assert!(d <= Duration::from_millis(base), "retry {retry}: {d:?}");
        }
    }
}
