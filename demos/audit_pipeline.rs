//! # Example: audit_pipeline
//!
//! A CRUD handler's side-channel end to end: each mutation enqueues an audit
//! record and publishes a realtime event; the consumer writes audit rows into
//! an in-memory table whose "database" fails now and then.
//!
//! ## Flow
//! ```text
//! handler(create/update/delete)
//!   ├─► enqueue_audit(record) ──► WorkQueue ──► RetryExecutor ──► AuditTable::insert
//!   │                                                 └─ transient error → backoff, retry
//!   └─► publish("transmutation.*", dto) ──► Broker ──► subscribers
//! ```
//!
//! ## Run
//! ```bash
//! JOB_BACKOFF_MS=50 cargo run --example audit_pipeline
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use backchannel::{
    AuditAction, AuditRecord, Backchannel, Config, Payload, ProcessError, ProcessorFn,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Stand-in for the audits table.
#[derive(Default)]
struct AuditTable {
    rows: Mutex<Vec<AuditRecord>>,
    writes: AtomicU32,
}

impl AuditTable {
    fn insert(&self, record: AuditRecord) -> Result<(), ProcessError> {
        // Every third write hits a transient "connection reset".
        if self.writes.fetch_add(1, Ordering::Relaxed) % 3 == 2 {
            return Err(ProcessError::retryable("connection reset by peer"));
        }
        println!(
            "[db] audit {} {}#{}",
            record.action.as_str(),
            record.entity,
            record.entity_id
        );
        self.rows
            .lock()
            .map_err(|_| ProcessError::permanent("audit table poisoned"))?
            .push(record);
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::from_env()?;
    let bc = Backchannel::new(cfg);
    let mut screen = bc.broker().subscribe().await;

    let table = Arc::new(AuditTable::default());
    let t = Arc::clone(&table);
    let processor = ProcessorFn::arc("audit-writer", move |payload: Payload| {
        let t = Arc::clone(&t);
        async move { t.insert(AuditRecord::from_payload(&payload)?) }
    });
    let consumer = bc.start_default_consumer(processor).await?;

    // What the HTTP handlers would do per request.
    let request = CancellationToken::new();
    for (action, id, kind) in [
        (AuditAction::Create, 1, "transmutation.created"),
        (AuditAction::Update, 1, "transmutation.updated"),
        (AuditAction::Create, 2, "transmutation.created"),
        (AuditAction::Delete, 1, "transmutation.deleted"),
    ] {
        let record = AuditRecord::new(action, "transmutations", id)
            .with_meta(json!({ "path": format!("/transmutations/{id}") }));
        let _ = bc.enqueue_audit(&record, &request).await?;
        bc.publish(kind, json!({ "id": id })).await;
    }
    let _ = bc.enqueue_audit(&AuditRecord::daily_check(), &request).await?;

    while let Some(ev) = screen.try_recv() {
        println!("[screen] {} {}", ev.kind, ev.data);
    }

    bc.shutdown().await;
    let (mut errors, join) = consumer.into_parts();
    join.await?;
    while let Some(report) = errors.recv().await {
        println!("[main] gave up: {report}");
    }

    let rows = table.rows.lock().map(|r| r.len()).unwrap_or(0);
    println!("[main] {rows} audit rows written");
    Ok(())
}
