//! Retry and backoff policies.
//!
//! This module groups the knobs that control **whether** a failed payload is
//! attempted again and **how long** the consumer waits in between.
//!
//! ## Contents
//! - [`RetryPolicy`]   attempt budget, dead-letter routing, shutdown behaviour
//! - [`BackoffPolicy`] how delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization on top of the computed delay
//!
//! ## Quick wiring
//! ```text
//! RetryPolicy { max_attempts, backoff: BackoffPolicy, dead_letter, interrupt_backoff }
//!      └─► executor::RetryExecutor uses:
//!           - allows_retry(attempt) to decide retry vs exhausted
//!           - delay_after(attempt) to sleep between attempts
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::default()` → 5 attempts, dead letters on, uninterruptible backoff.
//! - `BackoffPolicy::default()` → first=500ms, factor=2.0, max=30s, jitter=None.

mod backoff;
mod jitter;
mod retry;

pub use backoff::{BackoffPolicy, DEFAULT_FACTOR};
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
