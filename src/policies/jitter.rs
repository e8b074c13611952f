//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] spreads retries of many processes that failed at the same
//! moment. The executor itself is single-consumer, so the default is `None`;
//! jitter matters when several workers share one downstream.
//!
//! - [`JitterPolicy::None`] exact backoff delay
//! - [`JitterPolicy::Full`] random in `[0, base]`
//! - [`JitterPolicy::Equal`] `base/2 + random[0, base/2]`
//! - [`JitterPolicy::Decorrelated`] random in `[floor, base × 3]`, capped

use std::time::Duration;

use rand::Rng;

/// Randomization applied on top of the computed backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter: predictable delays.
    #[default]
    None,
    /// Random delay in `[0, base]`.
    Full,
    /// Half the base plus a random half.
    Equal,
    /// Random delay in `[floor, base × 3]`, capped at the policy maximum.
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `base`.
    ///
    /// `floor` is only used by `Decorrelated`; the result never exceeds `cap`.
    /// The random source is injected so tests can use a seeded generator.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        base: Duration,
        floor: Duration,
        cap: Duration,
    ) -> Duration {
        let base_ms = millis(base);
        let cap_ms = millis(cap);

        let ms = match self {
            JitterPolicy::None => return base.min(cap),
            JitterPolicy::Full => {
                if base_ms == 0 {
                    0
                } else {
                    rng.random_range(0..=base_ms)
                }
            }
            JitterPolicy::Equal => {
                let half = base_ms / 2;
                if half == 0 {
                    base_ms
                } else {
                    half + rng.random_range(0..=half)
                }
            }
            JitterPolicy::Decorrelated => {
                let lo = millis(floor).min(cap_ms);
                let hi = base_ms.saturating_mul(3).min(cap_ms).max(lo);
                if lo == hi {
                    lo
                } else {
                    rng.random_range(lo..=hi)
                }
            }
        };
        Duration::from_millis(ms.min(cap_ms))
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
