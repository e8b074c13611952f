//! # Core observer trait
//!
//! [`Observe`] is the extension point for plugging metrics, alerting or audit
//! sinks into the runtime. Each observer is driven by a dedicated worker loop
//! fed by a bounded queue owned by the [`ObserverSet`](crate::ObserverSet).
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching); they never block the queue,
//!   the executor or the broker.
//! - Each observer declares its preferred queue capacity via
//!   [`Observe::queue_capacity`]. On overflow the event is dropped for that
//!   observer and an `ObserverOverflow` event is published.
//!
//! ## Example
//! ```rust
//! use backchannel::{EventKind, Observe, RuntimeEvent};
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! #[derive(Default)]
//! struct DeadLetterAlarm(AtomicU64);
//!
//! #[async_trait::async_trait]
//! impl Observe for DeadLetterAlarm {
//!     async fn on_event(&self, ev: &RuntimeEvent) {
//!         if ev.kind == EventKind::DeadLettered {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "dead-letter-alarm" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::RuntimeEvent;

/// Contract for runtime-event observers.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &RuntimeEvent);

    /// Human-readable name (for logs/metrics).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this observer's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
