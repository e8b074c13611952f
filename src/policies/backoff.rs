//! # Backoff policy for retrying payloads.
//!
//! [`BackoffPolicy`] controls how the delay between two attempts of the same
//! payload grows after repeated failures. It is parameterized by:
//! - [`BackoffPolicy::first`] the delay after the first failed attempt;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the cap applied to every computed delay.
//!
//! The delay after attempt `n` (1-based) is `first × factor^(n-1)`, clamped to
//! `max`, then jitter is applied. Each delay is derived from the attempt number
//! alone, so jitter never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use backchannel::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(10),
//!     max: Duration::from_millis(100),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay_after(1), Duration::from_millis(10));
//! assert_eq!(backoff.delay_after(2), Duration::from_millis(20));
//! assert_eq!(backoff.delay_after(5), Duration::from_millis(100)); // 160ms capped
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Factor used when a configured factor cannot grow the delay.
pub const DEFAULT_FACTOR: f64 = 2.0;

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    pub first: Duration,
    /// Cap for every computed delay (`Duration::ZERO` = uncapped).
    pub max: Duration,
    /// Multiplicative growth factor; values `<= 1.0` are normalized to `2.0`.
    pub factor: f64,
    /// Randomization applied to the capped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns the worker defaults:
    /// - `first = 500ms`;
    /// - `max = 30s`;
    /// - `factor = 2.0`;
    /// - `jitter = None`.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: DEFAULT_FACTOR,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Returns a copy with the factor forced into the growing range.
    ///
    /// Non-finite factors and factors `<= 1.0` become [`DEFAULT_FACTOR`].
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if !self.factor.is_finite() || self.factor <= 1.0 {
            self.factor = DEFAULT_FACTOR;
        }
        self
    }

    /// Deterministic part of the delay after `attempt` (1-based): no jitter.
    ///
    /// `attempt = 0` is treated as `1`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let unclamped = self.first.as_secs_f64() * self.factor.powi(exp);

        let capped = self.max > Duration::ZERO;
        if !unclamped.is_finite() || unclamped < 0.0 {
            return if capped {
                self.max
            } else {
                Duration::from_nanos(u64::MAX)
            };
        }
        if capped && unclamped > self.max.as_secs_f64() {
            return self.max;
        }
        let nanos = (unclamped * 1e9).round();
        if nanos >= u64::MAX as f64 {
            Duration::from_nanos(u64::MAX)
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }

    /// Delay to wait after failed `attempt` (1-based) before the next one.
    ///
    /// The jittered result is still bounded by [`BackoffPolicy::max`].
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let cap = if self.max > Duration::ZERO {
            self.max
        } else {
            base
        };
        self.jitter
            .apply(&mut rand::rng(), base, self.first.min(cap), cap)
    }
}
