//! # Example: retry_with_backoff
//!
//! Demonstrates how the consumer retries a failing payload according to
//! [`RetryPolicy`] and [`BackoffPolicy`], and what happens once the budget is
//! spent.
//!
//! Payload `flaky` fails twice and then succeeds. Payload `doomed` always
//! fails and ends up in the dead-letter sink.
//!
//! ## Flow
//! ```text
//! RetryExecutor
//!   ├─► flaky: attempt 1 → Err, sleep 100ms
//!   │          attempt 2 → Err, sleep ≈200ms
//!   │          attempt 3 → Ok
//!   └─► doomed: attempt 1..4 → Err
//!               └─► dead letter + ErrorStream report
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example retry_with_backoff
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backchannel::{
    Backchannel, BackoffPolicy, Config, JitterPolicy, Payload, ProcessError, ProcessorFn,
    RetryPolicy,
};
use tokio_util::sync::CancellationToken;

static FLAKY_ATTEMPTS: AtomicU32 = AtomicU32::new(0);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bc = Backchannel::new(Config::default());
    let mut dead = bc.dead_letters().await.ok_or("dead letters already taken")?;

    let processor = ProcessorFn::arc("flaky-writer", |payload: Payload| async move {
        let name = String::from_utf8_lossy(payload.as_bytes()).to_string();
        match name.as_str() {
            "flaky" => {
                let attempt = FLAKY_ATTEMPTS.fetch_add(1, Ordering::Relaxed) + 1;
                if attempt <= 2 {
                    println!("[flaky] attempt {attempt} failed");
                    Err(ProcessError::retryable(format!("boom #{attempt}")))
                } else {
                    println!("[flaky] attempt {attempt} succeeded");
                    Ok(())
                }
            }
            _ => {
                println!("[{name}] failed");
                Err(ProcessError::retryable("database unavailable"))
            }
        }
    });

    let policy = RetryPolicy {
        max_attempts: 4,
        backoff: BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(1),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        },
        ..RetryPolicy::default()
    };
    let consumer = bc.start_consumer(processor, policy).await?;

    let never = CancellationToken::new();
    let _ = bc.enqueue("flaky".into(), &never).await;
    let _ = bc.enqueue("doomed".into(), &never).await;
    bc.shutdown().await;

    let (mut errors, join) = consumer.into_parts();
    join.await?;

    while let Some(report) = errors.recv().await {
        println!("[main] exhausted: {report}");
    }
    while let Some(payload) = dead.recv().await {
        println!("[main] dead letter: {payload:?}");
    }
    println!("[main] totals: {:?}", bc.counters().snapshot());
    Ok(())
}
