//! # LogWriter: runtime events as structured log lines
//!
//! Forwards every [`RuntimeEvent`] to `tracing`, at a level matching its
//! severity. Install any `tracing` subscriber to see the output.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! WARN backchannel: attempt failed attempt=1 reason="processing failed: db down"
//! INFO backchannel: backoff scheduled attempt=1 delay_ms=500
//! WARN backchannel: payload dead-lettered
//! INFO backchannel: subscriber joined subscriber=3
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{EventKind, RuntimeEvent};
use crate::observers::Observe;

/// Event writer observer.
#[derive(Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &RuntimeEvent) {
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::EnqueueAbandoned => debug!(reason, "enqueue abandoned"),
            EventKind::AttemptFailed => warn!(attempt = ?e.attempt, reason, "attempt failed"),
            EventKind::BackoffScheduled => {
                info!(attempt = ?e.attempt, delay_ms = ?e.delay_ms, "backoff scheduled")
            }
            EventKind::PayloadProcessed => debug!(attempt = ?e.attempt, "payload processed"),
            EventKind::PayloadExhausted => {
                warn!(attempt = ?e.attempt, reason, "payload exhausted")
            }
            EventKind::DeadLettered => warn!("payload dead-lettered"),
            EventKind::DeadLetterDropped => warn!(reason, "dead letter dropped"),
            EventKind::ReportDropped => warn!("exhausted-payload report dropped"),
            EventKind::ConsumerStopped => info!("consumer stopped"),
            EventKind::SubscriberJoined => info!(subscriber = ?e.subscriber, "subscriber joined"),
            EventKind::SubscriberLeft => info!(subscriber = ?e.subscriber, "subscriber left"),
            EventKind::EventPublished => debug!(topic = ?e.topic, "event published"),
            EventKind::EventDropped => debug!(
                subscriber = ?e.subscriber,
                topic = ?e.topic,
                reason,
                "event dropped for subscriber"
            ),
            EventKind::StreamFailed => {
                warn!(subscriber = ?e.subscriber, reason, "stream write failed")
            }
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::ObserverOverflow => {
                warn!(observer = e.observer.unwrap_or("unknown"), reason, "observer overflow")
            }
            EventKind::ObserverPanicked => {
                warn!(observer = e.observer.unwrap_or("unknown"), reason, "observer panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
