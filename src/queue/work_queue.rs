//! # Bounded FIFO work queue.
//!
//! [`WorkQueue`] carries [`Payload`]s from many producers to exactly one
//! consumer (the retry executor).
//!
//! ## Rules
//! - **Backpressure**: a full queue suspends `enqueue` until room frees up,
//!   the caller's token fires, or the queue shuts down. Nothing is dropped.
//! - **Fire-and-forget**: `enqueue` never fails; the returned
//!   [`EnqueueOutcome`] may be ignored.
//! - **Single consumer**: the receiving end is handed out once.
//! - **Shutdown**: closes intake; queued items are still delivered, then the
//!   consumer observes end-of-stream.
//!
//! ```text
//! producer ─┐
//! producer ─┼─► [ cap slots, FIFO ] ──► RetryExecutor
//! producer ─┘        ▲
//!          shutdown ─┘ drops the sender: drain, then None
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::QueueError;
use crate::events::{Bus, EventKind, RuntimeEvent};
use crate::payload::Payload;

/// What happened to an `enqueue` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "ignore explicitly with `let _ =` if fire-and-forget is intended"]
pub enum EnqueueOutcome {
    /// The payload is in the queue.
    Queued,
    /// The caller's token fired before room was available.
    Cancelled,
    /// The queue is shut down; the payload was discarded.
    Closed,
}

struct Inner {
    tx: RwLock<Option<mpsc::Sender<Payload>>>,
    rx: Mutex<Option<mpsc::Receiver<Payload>>>,
    closed: CancellationToken,
    pending: Arc<AtomicUsize>,
    capacity: usize,
    bus: Bus,
}

/// Receiving end of a [`WorkQueue`], owned by the consumer.
#[derive(Debug)]
pub(crate) struct QueueReceiver {
    rx: mpsc::Receiver<Payload>,
    pending: Arc<AtomicUsize>,
}

impl QueueReceiver {
    /// Next payload in FIFO order; `None` once closed and drained.
    pub(crate) async fn recv(&mut self) -> Option<Payload> {
        let payload = self.rx.recv().await?;
        self.pending.fetch_sub(1, Ordering::AcqRel);
        Some(payload)
    }
}

/// Cloneable handle to one bounded queue.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl WorkQueue {
    /// Creates an open queue holding at most `capacity` payloads (minimum 1).
    pub fn new(capacity: usize, bus: Bus) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                tx: RwLock::new(Some(tx)),
                rx: Mutex::new(Some(rx)),
                closed: CancellationToken::new(),
                pending: Arc::new(AtomicUsize::new(0)),
                capacity,
                bus,
            }),
        }
    }

    /// Places `payload` on the queue, waiting for room if needed.
    ///
    /// Returns when the payload is queued, `cancel` fires, or the queue shuts
    /// down. Abandoning is not an error.
    pub async fn enqueue(&self, payload: Payload, cancel: &CancellationToken) -> EnqueueOutcome {
        let Some(tx) = self.sender().await else {
            return self.abandon(EnqueueOutcome::Closed);
        };

        tokio::select! {
            biased;
            res = tx.reserve() => match res {
                Ok(permit) => {
                    self.inner.pending.fetch_add(1, Ordering::AcqRel);
                    permit.send(payload);
                    EnqueueOutcome::Queued
                }
                Err(_) => self.abandon(EnqueueOutcome::Closed),
            },
            _ = cancel.cancelled() => self.abandon(EnqueueOutcome::Cancelled),
            _ = self.inner.closed.cancelled() => self.abandon(EnqueueOutcome::Closed),
        }
    }

    /// Places `payload` on the queue only if there is room right now.
    pub async fn try_enqueue(&self, payload: Payload) -> Result<(), QueueError> {
        let tx = self.sender().await.ok_or(QueueError::Closed)?;
        let permit = tx.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => QueueError::Full,
            mpsc::error::TrySendError::Closed(()) => QueueError::Closed,
        })?;
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        permit.send(payload);
        Ok(())
    }

    /// Hands out the receiving end; only the first call succeeds.
    pub(crate) async fn take_receiver(&self) -> Result<QueueReceiver, QueueError> {
        let rx = self
            .inner
            .rx
            .lock()
            .await
            .take()
            .ok_or(QueueError::ConsumerTaken)?;
        Ok(QueueReceiver {
            rx,
            pending: Arc::clone(&self.inner.pending),
        })
    }

    /// Closes intake. Returns `false` if the queue was already closed.
    ///
    /// Producers blocked on a full queue return [`EnqueueOutcome::Closed`].
    pub async fn shutdown(&self) -> bool {
        self.inner.closed.cancel();
        let was_open = self.inner.tx.write().await.take().is_some();
        if was_open {
            debug!(capacity = self.inner.capacity, "work queue closed");
        }
        was_open
    }

    /// Payloads queued and not yet handed to the consumer.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued payloads.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// True once [`WorkQueue::shutdown`] was called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    async fn sender(&self) -> Option<mpsc::Sender<Payload>> {
        self.inner.tx.read().await.clone()
    }

    fn abandon(&self, outcome: EnqueueOutcome) -> EnqueueOutcome {
        let reason = match outcome {
            EnqueueOutcome::Cancelled => "cancelled",
            _ => "closed",
        };
        self.inner
            .bus
            .publish(RuntimeEvent::new(EventKind::EnqueueAbandoned).with_reason(reason));
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn queue(cap: usize) -> WorkQueue {
        WorkQueue::new(cap, Bus::new(16))
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let q = queue(4);
        let never = CancellationToken::new();
        for p in ["a", "b", "c"] {
            assert_eq!(q.enqueue(p.into(), &never).await, EnqueueOutcome::Queued);
        }
        assert_eq!(q.len(), 3);
        let mut rx = q.take_receiver().await.expect("receiver");
        for p in ["a", "b", "c"] {
            assert_eq!(rx.recv().await.expect("payload").as_bytes(), p.as_bytes());
        }
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_single_consumer() {
        let q = queue(1);
        assert!(q.take_receiver().await.is_ok());
        assert_eq!(q.take_receiver().await.unwrap_err(), QueueError::ConsumerTaken);
    }

    #[tokio::test]
    async fn test_full_queue_blocks_until_cancelled() {
        let q = queue(1);
        let cancel = CancellationToken::new();
        assert_eq!(q.enqueue("a".into(), &cancel).await, EnqueueOutcome::Queued);
        assert_eq!(q.try_enqueue("b".into()).await, Err(QueueError::Full));

        let q2 = q.clone();
        let c2 = cancel.clone();
        let blocked = tokio::spawn(async move { q2.enqueue("b".into(), &c2).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        cancel.cancel();
        assert_eq!(blocked.await.expect("join"), EnqueueOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_blocked_producer_resumes_when_room_frees() {
        let q = queue(1);
        let never = CancellationToken::new();
        let _ = q.enqueue("a".into(), &never).await;
        let mut rx = q.take_receiver().await.expect("receiver");

        let q2 = q.clone();
        let blocked = tokio::spawn(async move {
            q2.enqueue("b".into(), &CancellationToken::new()).await
        });
        assert_eq!(rx.recv().await.expect("a").as_bytes(), b"a");
        assert_eq!(blocked.await.expect("join"), EnqueueOutcome::Queued);
        assert_eq!(rx.recv().await.expect("b").as_bytes(), b"b");
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_ends() {
        let q = queue(4);
        let never = CancellationToken::new();
        let _ = q.enqueue("a".into(), &never).await;
        let _ = q.enqueue("b".into(), &never).await;
        let mut rx = q.take_receiver().await.expect("receiver");

        assert!(q.shutdown().await);
        assert!(!q.shutdown().await);
        assert!(q.is_closed());
        assert_eq!(q.enqueue("c".into(), &never).await, EnqueueOutcome::Closed);
        assert_eq!(q.try_enqueue("c".into()).await, Err(QueueError::Closed));

        assert_eq!(rx.recv().await.expect("a").as_bytes(), b"a");
        assert_eq!(rx.recv().await.expect("b").as_bytes(), b"b");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_releases_blocked_producer() {
        let q = queue(1);
        let never = CancellationToken::new();
        let _ = q.enqueue("a".into(), &never).await;

        let q2 = q.clone();
        let blocked = tokio::spawn(async move {
            q2.enqueue("b".into(), &CancellationToken::new()).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.shutdown().await;
        assert_eq!(blocked.await.expect("join"), EnqueueOutcome::Closed);
    }

    #[tokio::test]
    async fn test_abandon_is_published() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let q = WorkQueue::new(1, bus);
        q.shutdown().await;
        let _ = q.enqueue("x".into(), &CancellationToken::new()).await;

        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.kind, EventKind::EnqueueAbandoned);
        assert_eq!(ev.reason.as_deref(), Some("closed"));
    }
}
