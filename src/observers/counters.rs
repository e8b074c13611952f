//! # Counters: in-process activity totals
//!
//! [`Counters`] turns runtime events into monotonic totals that an HTTP layer
//! can expose (worker job results, stream client gauge, events per outcome).
//! Drops in the sink, the report stream and subscriber mailboxes show up here.
//!
//! Totals are fed from the runtime bus, so a lagging listener undercounts
//! them (the listener logs how many events it skipped). The exact drop
//! counts live next to the drops: [`Broker::dropped_events`],
//! [`DeadLetterSink::dropped`] and [`ErrorStream::dropped`].
//!
//! [`Broker::dropped_events`]: crate::Broker::dropped_events
//! [`DeadLetterSink::dropped`]: crate::DeadLetterSink::dropped
//! [`ErrorStream::dropped`]: crate::ErrorStream::dropped

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Serialize;

use crate::events::{EventKind, RuntimeEvent};
use crate::observers::Observe;

/// Observer that counts runtime events by outcome.
#[derive(Debug, Default)]
pub struct Counters {
    processed: AtomicU64,
    failed_attempts: AtomicU64,
    exhausted: AtomicU64,
    dead_lettered: AtomicU64,
    dead_letters_dropped: AtomicU64,
    reports_dropped: AtomicU64,
    enqueues_abandoned: AtomicU64,
    events_published: AtomicU64,
    events_dropped: AtomicU64,
    subscribers_joined: AtomicU64,
    subscribers_left: AtomicU64,
}

/// Point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub processed: u64,
    pub failed_attempts: u64,
    pub exhausted: u64,
    pub dead_lettered: u64,
    pub dead_letters_dropped: u64,
    pub reports_dropped: u64,
    pub enqueues_abandoned: u64,
    pub events_published: u64,
    pub events_dropped: u64,
    /// Stream subscribers currently connected.
    pub active_subscribers: u64,
}

impl Counters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event; returns `false` if the kind is not counted.
    pub fn record(&self, ev: &RuntimeEvent) -> bool {
        let counter = match ev.kind {
            EventKind::PayloadProcessed => &self.processed,
            EventKind::AttemptFailed => &self.failed_attempts,
            EventKind::PayloadExhausted => &self.exhausted,
            EventKind::DeadLettered => &self.dead_lettered,
            EventKind::DeadLetterDropped => &self.dead_letters_dropped,
            EventKind::ReportDropped => &self.reports_dropped,
            EventKind::EnqueueAbandoned => &self.enqueues_abandoned,
            EventKind::EventPublished => &self.events_published,
            EventKind::EventDropped => &self.events_dropped,
            EventKind::SubscriberJoined => &self.subscribers_joined,
            EventKind::SubscriberLeft => &self.subscribers_left,
            _ => return false,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Reads all totals.
    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let joined = load(&self.subscribers_joined);
        let left = load(&self.subscribers_left);
        CounterSnapshot {
            processed: load(&self.processed),
            failed_attempts: load(&self.failed_attempts),
            exhausted: load(&self.exhausted),
            dead_lettered: load(&self.dead_lettered),
            dead_letters_dropped: load(&self.dead_letters_dropped),
            reports_dropped: load(&self.reports_dropped),
            enqueues_abandoned: load(&self.enqueues_abandoned),
            events_published: load(&self.events_published),
            events_dropped: load(&self.events_dropped),
            active_subscribers: joined.saturating_sub(left),
        }
    }
}

#[async_trait]
impl Observe for Counters {
    async fn on_event(&self, ev: &RuntimeEvent) {
        self.record(ev);
    }

    fn name(&self) -> &'static str {
        "counters"
    }
}
