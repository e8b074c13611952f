//! Consumer handle and the exhausted-payload report stream.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::error::ProcessError;
use crate::payload::Payload;

/// Report for one payload that will not be attempted again.
#[derive(Error, Debug, Clone)]
#[error("payload exhausted after {attempts} attempt(s): {error}")]
pub struct ExhaustedPayload {
    /// The payload as it was enqueued.
    pub payload: Payload,
    /// Attempts made, including the last one.
    pub attempts: u32,
    /// Error from the last attempt (or [`ProcessError::Interrupted`]).
    pub error: ProcessError,
    /// True if the payload reached the dead-letter sink.
    pub dead_lettered: bool,
}

/// Stream of [`ExhaustedPayload`] reports.
///
/// Bounded; reports that find it full are dropped and counted. Ends once the
/// consumer stopped.
#[derive(Debug)]
pub struct ErrorStream {
    rx: mpsc::Receiver<ExhaustedPayload>,
    dropped: Arc<AtomicU64>,
}

/// Producer side of an [`ErrorStream`]; never waits.
#[derive(Debug)]
pub(crate) struct ReportSender {
    tx: mpsc::Sender<ExhaustedPayload>,
    dropped: Arc<AtomicU64>,
}

/// Creates a report channel holding up to `capacity` (min 1) reports.
pub(crate) fn report_channel(capacity: usize) -> (ReportSender, ErrorStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        ReportSender {
            tx,
            dropped: Arc::clone(&dropped),
        },
        ErrorStream { rx, dropped },
    )
}

impl ReportSender {
    /// Queues `report`, or drops and counts it.
    ///
    /// On drop returns `"full"` or `"closed"`.
    pub(crate) fn send(&self, report: ExhaustedPayload) -> Result<(), &'static str> {
        self.tx.try_send(report).map_err(|e| {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => "full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            }
        })
    }
}

impl ErrorStream {
    /// Reports lost because the stream was full or already dropped.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn recv(&mut self) -> Option<ExhaustedPayload> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ExhaustedPayload> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ErrorStream {
    type Item = ExhaustedPayload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ExhaustedPayload>> {
        self.rx.poll_recv(cx)
    }
}

/// Handle to a running consumer.
///
/// Dropping the handle does not stop the consumer; shut the queue down for that.
#[derive(Debug)]
pub struct ConsumerHandle {
    /// Exhausted-payload reports.
    pub errors: ErrorStream,
    join: JoinHandle<()>,
}

impl ConsumerHandle {
    pub(crate) fn new(errors: ErrorStream, join: JoinHandle<()>) -> Self {
        Self { errors, join }
    }

    /// Waits until the consumer has drained the closed queue.
    ///
    /// Unread reports are discarded.
    pub async fn join(self) -> Result<(), JoinError> {
        self.join.await
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Splits into the report stream and the task handle.
    pub fn into_parts(self) -> (ErrorStream, JoinHandle<()>) {
        (self.errors, self.join)
    }
}
