//! # Example: custom_subscriber
//!
//! Demonstrates how to attach a custom runtime-event observer next to the
//! built-in [`LogWriter`].
//!
//! Shows how to:
//! - Implement the [`Observe`] trait.
//! - Inspect [`RuntimeEvent`] / [`EventKind`] for job and stream metrics.
//! - Wire observers in with [`Backchannel::builder`].
//!
//! ## Flow
//! ```text
//! WorkQueue / RetryExecutor / Broker
//!     └─► Bus ──► listener ──► ObserverSet
//!                                ├─► Counters
//!                                ├─► LogWriter  (tracing)
//!                                └─► ConsoleObserver.on_event()
//! ```
//!
//! ## Run
//! Requires the `logging` feature to export [`LogWriter`].
//! ```bash
//! RUST_LOG=debug cargo run --example custom_subscriber --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use backchannel::{
    Backchannel, BackoffPolicy, Config, EventKind, LogWriter, Observe, Payload, ProcessError,
    ProcessorFn, RetryPolicy, RuntimeEvent,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Prints job outcomes and stream activity.
struct ConsoleObserver;

#[async_trait::async_trait]
impl Observe for ConsoleObserver {
    async fn on_event(&self, ev: &RuntimeEvent) {
        match ev.kind {
            EventKind::PayloadProcessed => {
                println!("[obs] processed on attempt {}", ev.attempt.unwrap_or(0));
            }
            EventKind::AttemptFailed => {
                println!(
                    "[obs] attempt {} failed: {}",
                    ev.attempt.unwrap_or(0),
                    ev.reason.as_deref().unwrap_or("<none>")
                );
            }
            EventKind::BackoffScheduled => {
                println!("[obs] retry in {}ms", ev.delay_ms.unwrap_or(0));
            }
            EventKind::DeadLettered => println!("[obs] dead-lettered"),
            EventKind::EventPublished => {
                println!("[obs] published {}", ev.topic.as_deref().unwrap_or("<none>"));
            }
            EventKind::EventDropped => {
                println!(
                    "[obs] subscriber {} missed {}",
                    ev.subscriber.unwrap_or(0),
                    ev.topic.as_deref().unwrap_or("<none>")
                );
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let observers: Vec<Arc<dyn Observe>> = vec![Arc::new(LogWriter), Arc::new(ConsoleObserver)];
    let bc = Backchannel::builder(Config::default())
        .with_observers(observers)
        .build();

    let processor = ProcessorFn::arc("notifier", |payload: Payload| async move {
        if payload.as_bytes() == b"fail" {
            return Err(ProcessError::retryable("smtp timeout"));
        }
        Ok(())
    });
    let policy = RetryPolicy {
        max_attempts: 2,
        backoff: BackoffPolicy {
            first: Duration::from_millis(50),
            ..BackoffPolicy::default()
        },
        ..RetryPolicy::default()
    };
    let consumer = bc.start_consumer(processor, policy).await?;

    let never = CancellationToken::new();
    let _ = bc.enqueue("ok".into(), &never).await;
    let _ = bc.enqueue("fail".into(), &never).await;

    let _slow = bc.broker().subscribe().await;
    for n in 0..20 {
        bc.publish("materials.updated", json!({ "id": n })).await;
    }

    bc.shutdown().await;
    consumer.join().await?;

    // Give observer workers a moment to drain.
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("[main] totals: {:?}", bc.counters().snapshot());
    Ok(())
}
