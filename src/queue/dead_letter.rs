//! # Dead-letter sink for exhausted payloads.
//!
//! [`DeadLetterSink`] is a bounded holding area for payloads that will not be
//! processed again. Deposits never wait: when the sink is full or closed the
//! payload is dropped and counted, so a slow reader can never stall the
//! consumer. The reading end is handed out once as [`DeadLetters`].
//!
//! There is no replay: once read, a payload's fate is up to the reader.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::debug;

use crate::error::QueueError;
use crate::payload::Payload;

struct Inner {
    tx: RwLock<Option<mpsc::Sender<Payload>>>,
    rx: Mutex<Option<mpsc::Receiver<Payload>>>,
    dropped: AtomicU64,
    capacity: usize,
}

/// Cloneable handle to the dead-letter channel.
#[derive(Clone)]
pub struct DeadLetterSink {
    inner: Arc<Inner>,
}

impl DeadLetterSink {
    /// Creates an open sink holding at most `capacity` payloads (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                tx: RwLock::new(Some(tx)),
                rx: Mutex::new(Some(rx)),
                dropped: AtomicU64::new(0),
                capacity,
            }),
        }
    }

    /// Deposits without waiting.
    ///
    /// # Errors
    /// - [`QueueError::Full`] the sink has no room; the payload is dropped.
    /// - [`QueueError::Closed`] the sink was closed; the payload is dropped.
    pub async fn deposit(&self, payload: Payload) -> Result<(), QueueError> {
        let res = match self.inner.tx.read().await.as_ref() {
            Some(tx) => tx.try_send(payload).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            }),
            None => Err(QueueError::Closed),
        };
        if res.is_err() {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
        res
    }

    /// Hands out the reading end; `None` if it was already taken.
    pub async fn take_stream(&self) -> Option<DeadLetters> {
        self.inner.rx.lock().await.take().map(|rx| DeadLetters { rx })
    }

    /// Stops accepting deposits. The stream ends once already stored payloads are read.
    pub async fn close(&self) -> bool {
        let was_open = self.inner.tx.write().await.take().is_some();
        if was_open {
            debug!(
                dropped = self.dropped(),
                "dead-letter sink closed"
            );
        }
        was_open
    }

    /// Payloads lost because the sink was full or closed.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// Reading end of the dead-letter sink.
///
/// Also usable as a [`Stream`] of payloads.
#[derive(Debug)]
pub struct DeadLetters {
    rx: mpsc::Receiver<Payload>,
}

impl DeadLetters {
    /// Next dead payload; `None` after close once everything was read.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    /// Next dead payload if one is stored right now.
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }
}

impl Stream for DeadLetters {
    type Item = Payload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Payload>> {
        self.rx.poll_recv(cx)
    }
}
