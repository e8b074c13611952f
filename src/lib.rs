//! # backchannel
//!
//! **Backchannel** is the async side-channel of a CRUD admin backend: work
//! that must not slow down a request (audit rows, notifications) and realtime
//! push of domain events to connected admin screens.
//!
//! It provides a bounded in-memory work queue drained by one consumer with
//! exponential-backoff retries and a dead-letter sink, plus a broker that fans
//! events out to Server-Sent-Events subscribers with keepalive pings.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   HTTP handlers                                        admin screens (SSE)
//!      │      │                                                  ▲
//!      │      └── publish(kind, data) ──► Broker ──► mailboxes ──► serve_stream
//!      │                                     (bounded, drop on full)
//!      ▼
//!   enqueue(payload) ──► WorkQueue ──► RetryExecutor ──► Processor
//!   (waits when full)    (FIFO, cap)        │
//!                                           ├─ retry: sleep min(first·factor^(n-1), max)
//!                                           └─ exhausted:
//!                                                ├─► DeadLetterSink ──► DeadLetters
//!                                                └─► ErrorStream ────► ConsumerHandle
//!
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 Bus (broadcast of RuntimeEvent)                   │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                        listener ──► ObserverSet
//!                                 ┌──────┼──────┐
//!                                 ▼      ▼      ▼
//!                          Counters  LogWriter  custom
//! ```
//!
//! ### Payload lifecycle
//! ```text
//! Pending ──► Attempting ──► Succeeded
//!                 │
//!                 ├─ retryable, attempt < max ──► Retrying ──► Attempting
//!                 └─ permanent, or attempt = max ──► Exhausted
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                          |
//! |-------------------|----------------------------------------------------------|---------------------------------------------|
//! | **Queue**         | Bounded FIFO with backpressure, single consumer.         | [`WorkQueue`], [`EnqueueOutcome`]           |
//! | **Processing**    | Retry with backoff, tagged failures, dead letters.       | [`Processor`], [`ProcessorFn`], [`RetryPolicy`] |
//! | **Realtime**      | Fan-out to stream subscribers, SSE framing.              | [`Broker`], [`StreamWriter`], [`SseWriter`] |
//! | **Observability** | Runtime events, counters, custom observers.              | [`Observe`], [`Counters`], [`RuntimeEvent`] |
//! | **Errors**        | Typed errors with stable labels.                         | [`ProcessError`], [`QueueError`], [`StreamError`] |
//! | **Configuration** | Defaults and environment overrides.                      | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging`: exports the built-in [`LogWriter`] observer (runtime events → `tracing`).
//!
//! ## Example
//! ```rust
//! use backchannel::{
//!     AuditAction, AuditRecord, Backchannel, Config, Payload, ProcessError, ProcessorFn, RetryPolicy,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bc = Backchannel::new(Config::default());
//!
//!     let processor = ProcessorFn::arc("audit", |payload: Payload| async move {
//!         let record = AuditRecord::from_payload(&payload)?;
//!         println!("audit {} {}#{}", record.action.as_str(), record.entity, record.entity_id);
//!         Ok::<_, ProcessError>(())
//!     });
//!     let consumer = bc.start_consumer(processor, RetryPolicy::default()).await?;
//!
//!     let never = CancellationToken::new();
//!     let record = AuditRecord::new(AuditAction::Create, "materials", 1);
//!     let _ = bc.enqueue_audit(&record, &never).await?;
//!
//!     bc.shutdown().await;
//!     consumer.join().await?;
//!     Ok(())
//! }
//! ```

mod audit;
mod broker;
mod core;
mod error;
mod events;
mod executor;
mod observers;
mod payload;
mod policies;
mod queue;

// ---- Public re-exports ----

pub use crate::core::{Backchannel, BackchannelBuilder, Config};
pub use audit::{AuditAction, AuditRecord};
pub use broker::{Broker, BrokerConfig, Event, Frame, SSE_HEADERS, SseWriter, StreamWriter, SubscriberId, Subscription};
pub use error::{ConfigError, ProcessError, QueueError, StreamError};
pub use events::{Bus, EventKind, RuntimeEvent};
pub use executor::{ConsumerHandle, ErrorStream, ExhaustedPayload, Processor, ProcessorFn, ProcessorRef};
pub use observers::{CounterSnapshot, Counters, Observe, ObserverSet};
pub use payload::Payload;
pub use policies::{BackoffPolicy, DEFAULT_FACTOR, JitterPolicy, RetryPolicy};
pub use queue::{DeadLetterSink, DeadLetters, EnqueueOutcome, WorkQueue};

#[cfg(feature = "logging")]
pub use observers::LogWriter;
