//! # RetryExecutor: the single queue consumer.
//!
//! Takes payloads from the [`WorkQueue`](crate::WorkQueue) one at a time and
//! runs the [`Processor`] on each until it succeeds or the [`RetryPolicy`] is
//! exhausted.
//!
//! ## Payload lifecycle
//! ```text
//! recv ──► attempt n ──► Ok ─────────────────────────────► PayloadProcessed, next payload
//!              │
//!              └─► Err ──► AttemptFailed
//!                   ├─► retryable && n < max ──► BackoffScheduled ──► sleep ──► attempt n+1
//!                   └─► otherwise ──► PayloadExhausted
//!                                        ├─► dead letter (if enabled, never waits)
//!                                        └─► report on ErrorStream (never waits)
//! ```
//!
//! ## Rules
//! - **Strict FIFO**: the backoff sleep blocks the whole consumer; payloads
//!   behind a failing one wait (head-of-line blocking).
//! - **Isolation**: a panicking processor is caught and counts as a retryable failure.
//! - **Shutdown**: the executor stops once the queue is closed and drained,
//!   then closes the dead-letter sink so its stream ends too.
//!   A running backoff is only cut short with `interrupt_backoff`; the
//!   payload is then exhausted with [`ProcessError::Interrupted`].
//! - The consumer never stops because of one payload.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::ProcessError,
    events::{Bus, EventKind, RuntimeEvent},
    executor::{
        ConsumerHandle, ExhaustedPayload, ProcessorRef,
        handle::{ReportSender, report_channel},
    },
    observers::panic_message,
    payload::Payload,
    policies::RetryPolicy,
    queue::{DeadLetterSink, QueueReceiver},
};

/// Consumer that applies a [`RetryPolicy`] to every payload.
pub struct RetryExecutor {
    processor: ProcessorRef,
    policy: RetryPolicy,
    dead_letters: DeadLetterSink,
    bus: Bus,
    shutdown: CancellationToken,
}

impl RetryExecutor {
    /// Creates an executor. The policy is normalized and copied.
    ///
    /// `shutdown` is only consulted during backoff, and only when
    /// `policy.interrupt_backoff` is set.
    pub fn new(
        processor: ProcessorRef,
        policy: RetryPolicy,
        dead_letters: DeadLetterSink,
        bus: Bus,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            processor,
            policy: policy.normalized(),
            dead_letters,
            bus,
            shutdown,
        }
    }

    /// Spawns the consumer loop over `rx`.
    ///
    /// Must be called inside a tokio runtime.
    pub(crate) fn spawn(self, rx: QueueReceiver, report_capacity: usize) -> ConsumerHandle {
        let (tx, errors) = report_channel(report_capacity);
        let join = tokio::spawn(self.run(rx, tx));
        ConsumerHandle::new(errors, join)
    }

    async fn run(self, mut rx: QueueReceiver, reports: ReportSender) {
        debug!(
            processor = self.processor.name(),
            max_attempts = self.policy.max_attempts,
            "consumer started"
        );
        while let Some(payload) = rx.recv().await {
            self.handle(payload, &reports).await;
        }
        self.dead_letters.close().await;
        self.bus.publish(RuntimeEvent::new(EventKind::ConsumerStopped));
        debug!(processor = self.processor.name(), "consumer stopped");
    }

    async fn handle(&self, payload: Payload, reports: &ReportSender) {
        let mut attempt: u32 = 0;

        let error = loop {
            attempt += 1;
            let err = match self.attempt_once(&payload).await {
                Ok(()) => {
                    self.bus.publish(
                        RuntimeEvent::new(EventKind::PayloadProcessed).with_attempt(attempt),
                    );
                    return;
                }
                Err(e) => e,
            };

            self.bus.publish(
                RuntimeEvent::new(EventKind::AttemptFailed)
                    .with_attempt(attempt)
                    .with_reason(err.to_string()),
            );
            if !err.is_retryable() || !self.policy.allows_retry(attempt) {
                break err;
            }

            let delay = self.policy.delay_after(attempt);
            self.bus.publish(
                RuntimeEvent::new(EventKind::BackoffScheduled)
                    .with_attempt(attempt)
                    .with_delay(delay),
            );
            if !self.backoff(delay).await {
                break ProcessError::Interrupted { attempt };
            }
        };

        self.exhaust(payload, attempt, error, reports).await;
    }

    async fn attempt_once(&self, payload: &Payload) -> Result<(), ProcessError> {
        let fut = self.processor.process(payload);
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(res) => res,
            Err(panic_err) => Err(ProcessError::Panicked {
                info: panic_message(panic_err.as_ref()),
            }),
        }
    }

    /// Sleeps for `delay`. Returns `false` if shutdown cut the sleep short.
    async fn backoff(&self, delay: Duration) -> bool {
        if !self.policy.interrupt_backoff {
            time::sleep(delay).await;
            return true;
        }
        select! {
            _ = time::sleep(delay) => true,
            _ = self.shutdown.cancelled() => false,
        }
    }

    async fn exhaust(
        &self,
        payload: Payload,
        attempts: u32,
        error: ProcessError,
        reports: &ReportSender,
    ) {
        warn!(
            processor = self.processor.name(),
            attempts,
            error = error.as_label(),
            "payload exhausted"
        );
        self.bus.publish(
            RuntimeEvent::new(EventKind::PayloadExhausted)
                .with_attempt(attempts)
                .with_reason(error.to_string()),
        );

        let mut dead_lettered = false;
        if self.policy.dead_letter {
            match self.dead_letters.deposit(payload.clone()).await {
                Ok(()) => {
                    dead_lettered = true;
                    self.bus.publish(RuntimeEvent::new(EventKind::DeadLettered));
                }
                Err(e) => self.bus.publish(
                    RuntimeEvent::new(EventKind::DeadLetterDropped).with_reason(e.as_label()),
                ),
            }
        }

        let report = ExhaustedPayload {
            payload,
            attempts,
            error,
            dead_lettered,
        };
        if let Err(reason) = reports.send(report) {
            self.bus
                .publish(RuntimeEvent::new(EventKind::ReportDropped).with_reason(reason));
        }
    }
}
