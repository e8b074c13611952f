//! # Observers of runtime events.
//!
//! Observers receive every [`RuntimeEvent`](crate::RuntimeEvent) published on
//! the runtime [`Bus`](crate::events::Bus), each through its own bounded queue.
//!
//! ## Architecture
//! ```text
//! WorkQueue / RetryExecutor / Broker ── publish ──► Bus ──► listener ──► ObserverSet
//!                                                                          │
//!                                                        ┌─────────────────┼──────────────┐
//!                                                        ▼                 ▼              ▼
//!                                                    Counters          LogWriter       custom
//! ```

#[cfg(feature = "logging")]
mod embedded;

mod counters;
mod observe;
mod observer_set;

pub use counters::{CounterSnapshot, Counters};
#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use observe::Observe;
pub use observer_set::ObserverSet;
pub(crate) use observer_set::panic_message;
