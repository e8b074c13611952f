//! # Bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] used by the
//! queue, the executor and the broker to report what they are doing.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                  Listener (one per runtime):
//!   WorkQueue     ──┐
//!   RetryExecutor ──┼────► Bus ─────► observer listener ────► ObserverSet
//!   Broker        ──┘  (broadcast)     (in Backchannel)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never waits.
//! - **Bounded capacity**: one ring buffer shared by all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` items.
//! - **No persistence**: events sent with no receiver are lost.

use tokio::sync::broadcast;

use super::event::RuntimeEvent;

/// Broadcast channel for runtime events.
///
/// Cheap to clone; every clone publishes into the same channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<RuntimeEvent>,
}

impl Bus {
    /// Creates a bus with the given capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<RuntimeEvent>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers; dropped if there are none.
    pub fn publish(&self, ev: RuntimeEvent) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}
