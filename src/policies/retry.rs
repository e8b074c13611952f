//! # Retry policy for the queue consumer.
//!
//! [`RetryPolicy`] decides how many times a payload is attempted, how long the
//! consumer waits between attempts and what happens once the budget is spent.
//!
//! ```text
//! attempt 1 ── fail ──► sleep delay_after(1) ──► attempt 2 ── fail ──► ...
//!                                                          attempt max_attempts ── fail
//!                                                                     └─► dead letter (if enabled) + report
//! ```
//!
//! The policy is copied into the executor when the consumer starts; later
//! changes to the caller's value have no effect.

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Retry behaviour for one consumer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per payload, including the first (`0` is treated as `1`).
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
    /// Deposit exhausted payloads into the dead-letter sink.
    pub dead_letter: bool,
    /// Let shutdown cut an in-progress backoff short.
    ///
    /// When `false` (default) the consumer finishes the current sleep and retry
    /// before it observes shutdown, so shutdown latency is bounded by
    /// [`BackoffPolicy::max`].
    pub interrupt_backoff: bool,
}

impl Default for RetryPolicy {
    /// `max_attempts = 5`, default backoff, dead letters on, no interruption.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
            dead_letter: true,
            interrupt_backoff: false,
        }
    }
}

impl RetryPolicy {
    /// Returns a copy with every field in its valid range.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            max_attempts: self.max_attempts.max(1),
            backoff: self.backoff.normalized(),
            ..self
        }
    }

    /// True if another attempt may follow failed `attempt` (1-based).
    #[inline]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Delay to wait after failed `attempt`.
    #[inline]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.delay_after(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::JitterPolicy;

    #[test]
    fn test_normalized_clamps_attempts_and_factor() {
        let p = RetryPolicy {
            max_attempts: 0,
            backoff: BackoffPolicy {
                factor: 0.0,
                ..BackoffPolicy::default()
            },
            ..RetryPolicy::default()
        }
        .normalized();
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.backoff.factor, 2.0);
    }

    #[test]
    fn test_allows_retry_boundary() {
        let p = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        assert!(p.allows_retry(1));
        assert!(p.allows_retry(2));
        assert!(!p.allows_retry(3));
        assert!(!p.allows_retry(4));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let p = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(!p.allows_retry(1));
    }

    #[test]
    fn test_delay_schedule() {
        let p = RetryPolicy {
            max_attempts: 3,
            backoff: BackoffPolicy {
                first: Duration::from_millis(10),
                max: Duration::from_millis(100),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
            ..RetryPolicy::default()
        };
        assert_eq!(p.delay_after(1), Duration::from_millis(10));
        assert_eq!(p.delay_after(2), Duration::from_millis(20));
    }
}
