//! # Runtime events emitted by the queue, the executor and the broker.
//!
//! [`EventKind`] classifies activity across four groups:
//! - **Queue**: producers abandoning an enqueue;
//! - **Executor**: attempts, backoff, exhaustion, dead-letter routing;
//! - **Broker**: subscriber lifecycle, publications and per-subscriber drops;
//! - **Runtime**: shutdown and observer health.
//!
//! [`RuntimeEvent`] carries the optional metadata for each kind.
//!
//! ## Ordering guarantees
//! Every event gets a process-wide, monotonically increasing `seq`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use backchannel::{EventKind, RuntimeEvent};
//!
//! let ev = RuntimeEvent::new(EventKind::BackoffScheduled)
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(20))
//!     .with_reason("db down");
//!
//! assert_eq!(ev.kind, EventKind::BackoffScheduled);
//! assert_eq!(ev.delay_ms, Some(20));
//! assert_eq!(ev.reason.as_deref(), Some("db down"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for runtime events.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Queue ===
    /// A producer gave up waiting for room.
    ///
    /// Sets: `reason` (`"cancelled"` or `"closed"`).
    EnqueueAbandoned,

    // === Executor ===
    /// A processing attempt failed.
    ///
    /// Sets: `attempt`, `reason`.
    AttemptFailed,

    /// The consumer is sleeping before the next attempt.
    ///
    /// Sets: `attempt` (the failed one), `delay_ms`, `reason`.
    BackoffScheduled,

    /// A payload was processed successfully.
    ///
    /// Sets: `attempt`.
    PayloadProcessed,

    /// A payload reached its terminal failure state.
    ///
    /// Sets: `attempt`, `reason`.
    PayloadExhausted,

    /// An exhausted payload was deposited into the dead-letter sink.
    DeadLettered,

    /// An exhausted payload could not be deposited.
    ///
    /// Sets: `reason` (`"full"` or `"closed"`).
    DeadLetterDropped,

    /// The exhausted-payload report could not be delivered (error stream full or gone).
    ReportDropped,

    /// The consumer loop ended (queue closed and drained).
    ConsumerStopped,

    // === Broker ===
    /// A stream subscriber registered.
    ///
    /// Sets: `subscriber`.
    SubscriberJoined,

    /// A stream subscriber was removed.
    ///
    /// Sets: `subscriber`.
    SubscriberLeft,

    /// An event was broadcast.
    ///
    /// Sets: `topic`.
    EventPublished,

    /// A subscriber's mailbox could not take an event.
    ///
    /// Sets: `subscriber`, `topic`, `reason` (`"full"` or `"closed"`).
    EventDropped,

    /// A subscriber stream ended because the transport failed.
    ///
    /// Sets: `subscriber`, `reason`.
    StreamFailed,

    // === Runtime ===
    /// Shutdown was requested.
    ShutdownRequested,

    /// An observer's queue could not take an event.
    ///
    /// Sets: `observer`, `reason`.
    ObserverOverflow,

    /// An observer panicked while handling an event.
    ///
    /// Sets: `observer`, `reason`.
    ObserverPanicked,
}

impl EventKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::EnqueueAbandoned => "enqueue_abandoned",
            EventKind::AttemptFailed => "attempt_failed",
            EventKind::BackoffScheduled => "backoff_scheduled",
            EventKind::PayloadProcessed => "payload_processed",
            EventKind::PayloadExhausted => "payload_exhausted",
            EventKind::DeadLettered => "dead_lettered",
            EventKind::DeadLetterDropped => "dead_letter_dropped",
            EventKind::ReportDropped => "report_dropped",
            EventKind::ConsumerStopped => "consumer_stopped",
            EventKind::SubscriberJoined => "subscriber_joined",
            EventKind::SubscriberLeft => "subscriber_left",
            EventKind::EventPublished => "event_published",
            EventKind::EventDropped => "event_dropped",
            EventKind::StreamFailed => "stream_failed",
            EventKind::ShutdownRequested => "shutdown_requested",
            EventKind::ObserverOverflow => "observer_overflow",
            EventKind::ObserverPanicked => "observer_panicked",
        }
    }
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct RuntimeEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Attempt number (starting from 1).
    pub attempt: Option<u32>,
    /// Backoff delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, drop causes).
    pub reason: Option<Arc<str>>,
    /// Stream subscriber id, if applicable.
    pub subscriber: Option<u64>,
    /// Broker event type, if applicable.
    pub topic: Option<Arc<str>>,
    /// Observer name, if applicable.
    pub observer: Option<&'static str>,
}

impl RuntimeEvent {
    /// Creates an event of the given kind with the current time and the next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            attempt: None,
            delay_ms: None,
            reason: None,
            subscriber: None,
            topic: None,
            observer: None,
        }
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_subscriber(mut self, id: u64) -> Self {
        self.subscriber = Some(id);
        self
    }

    #[inline]
    pub fn with_topic(mut self, topic: impl Into<Arc<str>>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Creates an observer overflow event.
    #[inline]
    pub fn observer_overflow(observer: &'static str, reason: &'static str) -> Self {
        let mut ev = RuntimeEvent::new(EventKind::ObserverOverflow).with_reason(reason);
        ev.observer = Some(observer);
        ev
    }

    /// Creates an observer panic event.
    #[inline]
    pub fn observer_panicked(observer: &'static str, info: String) -> Self {
        let mut ev = RuntimeEvent::new(EventKind::ObserverPanicked).with_reason(info);
        ev.observer = Some(observer);
        ev
    }

    /// True for events about observers themselves (never re-reported on overflow).
    #[inline]
    pub fn is_observer_health(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ObserverOverflow | EventKind::ObserverPanicked
        )
    }
}
