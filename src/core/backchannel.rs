//! # Backchannel: the composition root.
//!
//! Owns one work queue, one dead-letter sink, one broker and the runtime
//! event bus, and wires them together.
//!
//! ## Architecture
//! ```text
//! handlers ── enqueue ──► WorkQueue ──► RetryExecutor ──► Processor
//!                                            ├─► DeadLetterSink ──► dead_letters()
//!                                            └─► ErrorStream ─────► ConsumerHandle
//!
//! handlers ── publish ──► Broker ──► serve_stream (one per connection)
//!
//! every component ── RuntimeEvent ──► Bus ──► listener ──► ObserverSet
//!                                                           ├─► Counters
//!                                                           └─► custom observers
//! ```
//!
//! ## Shutdown
//! ```text
//! shutdown()
//!   ├─► publish ShutdownRequested
//!   ├─► cancel token (cuts backoff short if the policy allows)
//!   ├─► queue.shutdown()   producers abandon, consumer drains then stops
//!   ├─► broker.shutdown()  connection loops return, mailboxes close
//!   └─► sink closes when the consumer stops (or now, if none was started)
//! ```
//!
//! ## Example
//! ```no_run
//! use backchannel::{Backchannel, Config, Payload, ProcessError, ProcessorFn, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bc = Backchannel::new(Config::from_env()?);
//!
//!     let processor = ProcessorFn::arc("audit", |payload: Payload| async move {
//!         println!("{} bytes", payload.len());
//!         Ok::<_, ProcessError>(())
//!     });
//!     let consumer = bc.start_consumer(processor, RetryPolicy::default()).await?;
//!
//!     let _ = bc.enqueue("hello".into(), &CancellationToken::new()).await;
//!     bc.publish("greeting", serde_json::json!({ "text": "hi" })).await;
//!
//!     bc.shutdown_on_signal().await?;
//!     consumer.join().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};

use crate::{
    audit::AuditRecord,
    broker::{Broker, StreamWriter},
    core::{config::Config, shutdown::wait_for_shutdown_signal},
    error::{QueueError, StreamError},
    events::{Bus, EventKind, RuntimeEvent},
    executor::{ConsumerHandle, ProcessorRef, RetryExecutor},
    observers::{Counters, Observe, ObserverSet},
    payload::Payload,
    policies::RetryPolicy,
    queue::{DeadLetterSink, DeadLetters, EnqueueOutcome, WorkQueue},
};

/// Builder for a [`Backchannel`] with extra observers.
pub struct BackchannelBuilder {
    cfg: Config,
    observers: Vec<Arc<dyn Observe>>,
}

impl BackchannelBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            observers: Vec::new(),
        }
    }

    /// Adds runtime-event observers. The built-in [`Counters`] is always present.
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers = observers;
        self
    }

    /// Builds the backchannel and starts the observer listener.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Backchannel {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let counters = Arc::new(Counters::new());

        let mut observers: Vec<Arc<dyn Observe>> = Vec::with_capacity(self.observers.len() + 1);
        observers.push(Arc::clone(&counters) as Arc<dyn Observe>);
        observers.extend(self.observers);
        let listener = CancellationToken::new();
        spawn_observer_listener(&bus, ObserverSet::new(observers, bus.clone()), listener.clone());

        Backchannel {
            queue: WorkQueue::new(self.cfg.queue_capacity, bus.clone()),
            dead_letters: DeadLetterSink::new(self.cfg.dead_letter_capacity),
            broker: Arc::new(Broker::new(self.cfg.broker, bus.clone())),
            consumer_started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            counters,
            bus,
            cfg: self.cfg,
            _listener: listener.drop_guard(),
        }
    }
}

/// Forwards bus events to the observer set until `stop` fires.
///
/// Events already buffered when `stop` fires are still delivered.
fn spawn_observer_listener(bus: &Bus, set: ObserverSet, stop: CancellationToken) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let res = tokio::select! {
                res = rx.recv() => res,
                _ = stop.cancelled() => break,
            };
            match res {
                Ok(ev) => set.emit(ev),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "observer listener lagged behind the runtime bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        while let Ok(ev) = rx.try_recv() {
            set.emit(ev);
        }
        set.shutdown().await;
    });
}

/// Async side-channel of the admin backend: background work plus realtime push.
pub struct Backchannel {
    cfg: Config,
    bus: Bus,
    queue: WorkQueue,
    dead_letters: DeadLetterSink,
    broker: Arc<Broker>,
    counters: Arc<Counters>,
    consumer_started: AtomicBool,
    shutdown: CancellationToken,
    _listener: DropGuard,
}

impl Backchannel {
    /// Builds a backchannel with only the built-in observers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(cfg: Config) -> Self {
        BackchannelBuilder::new(cfg).build()
    }

    pub fn builder(cfg: Config) -> BackchannelBuilder {
        BackchannelBuilder::new(cfg)
    }

    /// Fire-and-forget enqueue; waits only while the queue is full.
    pub async fn enqueue(&self, payload: Payload, cancel: &CancellationToken) -> EnqueueOutcome {
        self.queue.enqueue(payload, cancel).await
    }

    /// Enqueue that sheds instead of waiting.
    pub async fn try_enqueue(&self, payload: Payload) -> Result<(), QueueError> {
        self.queue.try_enqueue(payload).await
    }

    /// Encodes an audit record and enqueues it.
    pub async fn enqueue_audit(
        &self,
        record: &AuditRecord,
        cancel: &CancellationToken,
    ) -> Result<EnqueueOutcome, serde_json::Error> {
        let payload = record.to_payload()?;
        Ok(self.queue.enqueue(payload, cancel).await)
    }

    /// Starts the single consumer.
    ///
    /// # Errors
    /// [`QueueError::ConsumerTaken`] if a consumer was already started.
    pub async fn start_consumer(
        &self,
        processor: ProcessorRef,
        policy: RetryPolicy,
    ) -> Result<ConsumerHandle, QueueError> {
        let rx = self.queue.take_receiver().await?;
        self.consumer_started.store(true, Ordering::Release);

        let policy = policy.normalized();
        info!(
            processor = processor.name(),
            max_attempts = policy.max_attempts,
            dead_letter = policy.dead_letter,
            "starting consumer"
        );
        let executor = RetryExecutor::new(
            processor,
            policy,
            self.dead_letters.clone(),
            self.bus.clone(),
            self.shutdown.child_token(),
        );
        Ok(executor.spawn(rx, self.cfg.report_capacity))
    }

    /// Starts the consumer with the configured retry policy.
    pub async fn start_default_consumer(
        &self,
        processor: ProcessorRef,
    ) -> Result<ConsumerHandle, QueueError> {
        self.start_consumer(processor, self.cfg.retry).await
    }

    /// The dead-letter stream; `None` after the first call.
    pub async fn dead_letters(&self) -> Option<DeadLetters> {
        self.dead_letters.take_stream().await
    }

    /// Broadcasts an event to every live subscriber; returns how many got it.
    pub async fn publish(&self, kind: impl Into<String>, data: Value) -> usize {
        self.broker.publish(kind, data).await
    }

    /// Serves one subscriber connection until it ends. See [`Broker::serve_stream`].
    pub async fn serve_stream<W>(
        &self,
        conn: CancellationToken,
        writer: &mut W,
    ) -> Result<(), StreamError>
    where
        W: StreamWriter + ?Sized,
    {
        self.broker.serve_stream(conn, writer).await
    }

    /// Stops intake and realtime delivery.
    ///
    /// Queued payloads are still processed; await the consumer handle for
    /// that. A second call only logs.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            warn!("backchannel shutdown requested twice");
            return;
        }
        self.bus
            .publish(RuntimeEvent::new(EventKind::ShutdownRequested));
        self.shutdown.cancel();

        self.queue.shutdown().await;
        self.broker.shutdown().await;
        if !self.consumer_started.load(Ordering::Acquire) {
            self.dead_letters.close().await;
        }
        info!(pending = self.queue.len(), "backchannel shutting down");
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then shuts down.
    pub async fn shutdown_on_signal(&self) -> std::io::Result<()> {
        let signal = wait_for_shutdown_signal().await?;
        info!(signal, "shutdown signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Raw runtime events, as observers see them.
    pub fn subscribe_runtime(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.bus.subscribe()
    }

    /// Built-in totals.
    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }

    /// Shared broker handle for HTTP handlers.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
