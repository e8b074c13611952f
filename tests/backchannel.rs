use std::sync::{Arc, Mutex};
use std::time::Duration;

use backchannel::{
    AuditAction, AuditRecord, Backchannel, BackoffPolicy, BrokerConfig, Config, CounterSnapshot,
    EnqueueOutcome, EventKind, Payload, ProcessError, ProcessorFn, QueueError, RetryPolicy,
    SseWriter,
};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn config(queue: usize, mailbox: usize) -> Config {
    Config {
        queue_capacity: queue,
        broker: BrokerConfig {
            mailbox_capacity: mailbox,
            keepalive: Duration::from_secs(25),
        },
        ..Config::default()
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: BackoffPolicy {
            first: Duration::from_millis(10),
            max: Duration::from_millis(100),
            factor: 2.0,
            ..BackoffPolicy::default()
        },
        ..RetryPolicy::default()
    }
}

/// Polls the built-in counters until `done` holds.
async fn counters_until(bc: &Backchannel, done: impl Fn(&CounterSnapshot) -> bool) -> CounterSnapshot {
    for _ in 0..200 {
        let snap = bc.counters().snapshot();
        if done(&snap) {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bc.counters().snapshot()
}

#[tokio::test(start_paused = true)]
async fn always_failing_payload_is_dead_lettered_after_backoff() {
    let bc = Backchannel::new(config(2, 16));
    let mut dead = bc.dead_letters().await.expect("dead letters");
    assert!(bc.dead_letters().await.is_none());

    let start = Instant::now();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let c = Arc::clone(&calls);
    let processor = ProcessorFn::arc("always-fail", move |_p: Payload| {
        let c = Arc::clone(&c);
        async move {
            c.lock().unwrap().push(start.elapsed());
            Err::<(), _>(ProcessError::retryable("downstream unavailable"))
        }
    });
    let consumer = bc.start_consumer(processor, fast_retry(3)).await.expect("consumer");

    let never = CancellationToken::new();
    assert_eq!(bc.enqueue("job-1".into(), &never).await, EnqueueOutcome::Queued);
    bc.shutdown().await;

    let (mut errors, join) = consumer.into_parts();
    join.await.expect("consumer task");

    let offsets = calls.lock().unwrap().clone();
    assert_eq!(offsets.len(), 3);
    for (got, want_ms) in offsets.iter().zip([0u64, 10, 30]) {
        let want = Duration::from_millis(want_ms);
        assert!(*got >= want && *got <= want + Duration::from_millis(2), "{got:?} vs {want:?}");
    }

    let report = errors.recv().await.expect("one report");
    assert_eq!(report.attempts, 3);
    assert!(report.dead_lettered);
    assert!(errors.recv().await.is_none());

    assert_eq!(dead.recv().await.expect("dead letter").as_bytes(), b"job-1");
    assert!(dead.recv().await.is_none());

    let snap = counters_until(&bc, |s| s.dead_lettered == 1).await;
    assert_eq!(snap.failed_attempts, 3);
    assert_eq!(snap.exhausted, 1);
}

#[tokio::test]
async fn second_consumer_is_rejected() {
    let bc = Backchannel::new(Config::default());
    let ok = ProcessorFn::arc("ok", |_p: Payload| async { Ok::<_, ProcessError>(()) });
    let _first = bc.start_consumer(ok.clone(), RetryPolicy::default()).await.expect("first");
    let err = bc
        .start_consumer(ok, RetryPolicy::default())
        .await
        .expect_err("second consumer");
    assert_eq!(err, QueueError::ConsumerTaken);
}

#[tokio::test]
async fn audit_records_reach_the_processor_in_order() {
    let bc = Backchannel::new(Config::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    let processor = ProcessorFn::arc("audit", move |p: Payload| {
        let s = Arc::clone(&s);
        async move {
            let record = AuditRecord::from_payload(&p)?;
            s.lock().unwrap().push((record.action, record.entity_id));
            Ok::<_, ProcessError>(())
        }
    });
    let consumer = bc.start_consumer(processor, RetryPolicy::default()).await.expect("consumer");

    let never = CancellationToken::new();
    for (action, id) in [(AuditAction::Create, 1), (AuditAction::Update, 1), (AuditAction::Delete, 2)] {
        let rec = AuditRecord::new(action, "materials", id);
        assert_eq!(bc.enqueue_audit(&rec, &never).await.expect("encode"), EnqueueOutcome::Queued);
    }
    // Malformed payloads fail permanently on the first attempt.
    let _ = bc.enqueue("not json".into(), &never).await;

    bc.shutdown().await;
    let (mut errors, join) = consumer.into_parts();
    join.await.expect("consumer task");

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(AuditAction::Create, 1), (AuditAction::Update, 1), (AuditAction::Delete, 2)]
    );
    let report = errors.recv().await.expect("malformed report");
    assert_eq!(report.attempts, 1);
    assert_eq!(report.error.as_label(), "process_permanent");
}

#[tokio::test]
async fn enqueue_after_shutdown_is_a_noop() {
    let bc = Backchannel::new(Config::default());
    bc.shutdown().await;
    bc.shutdown().await;
    assert!(bc.is_shut_down());

    let never = CancellationToken::new();
    assert_eq!(bc.enqueue("late".into(), &never).await, EnqueueOutcome::Closed);
    assert_eq!(bc.try_enqueue("late".into()).await, Err(QueueError::Closed));
    assert_eq!(bc.publish("late", json!(null)).await, 0);

    let mut dead = bc.dead_letters().await.expect("dead letters");
    assert!(dead.recv().await.is_none());

    let snap = counters_until(&bc, |s| s.enqueues_abandoned == 1).await;
    assert_eq!(snap.enqueues_abandoned, 1);
}

#[tokio::test]
async fn producer_blocked_on_full_queue_can_give_up() {
    let bc = Arc::new(Backchannel::new(config(1, 16)));
    let never = CancellationToken::new();
    assert_eq!(bc.enqueue("a".into(), &never).await, EnqueueOutcome::Queued);

    let request = CancellationToken::new();
    let (bc2, r2) = (Arc::clone(&bc), request.clone());
    let blocked = tokio::spawn(async move { bc2.enqueue("b".into(), &r2).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!blocked.is_finished());

    request.cancel();
    assert_eq!(blocked.await.expect("join"), EnqueueOutcome::Cancelled);
    assert_eq!(bc.queue().len(), 1);
}

#[tokio::test]
async fn slow_subscriber_loses_events_while_mailbox_is_full() {
    let bc = Backchannel::new(config(4, 1));
    let mut sub = bc.broker().subscribe().await;

    assert_eq!(bc.publish("e", json!(1)).await, 1);
    assert_eq!(bc.publish("e", json!(2)).await, 0);
    assert_eq!(sub.recv().await.expect("event 1").data, json!(1));
    assert_eq!(bc.publish("e", json!(3)).await, 1);
    assert_eq!(sub.recv().await.expect("event 3").data, json!(3));

    assert_eq!(bc.broker().dropped_events(), 1);
    let snap = counters_until(&bc, |s| s.events_dropped == 1 && s.events_published == 3).await;
    assert_eq!(snap.events_dropped, 1);
    assert_eq!(snap.active_subscribers, 1);
}

#[tokio::test]
async fn sse_connection_receives_hello_then_events() {
    let bc = Arc::new(Backchannel::new(Config::default()));
    let (client, server) = tokio::io::duplex(4096);
    let conn = CancellationToken::new();

    let (bc2, c2) = (Arc::clone(&bc), conn.clone());
    let served = tokio::spawn(async move {
        let mut writer = SseWriter::new(server);
        bc2.serve_stream(c2, &mut writer).await
    });

    let mut client = client;
    let mut buf = vec![0u8; 4096];
    let n = client.read(&mut buf).await.expect("read hello");
    let hello = String::from_utf8_lossy(&buf[..n]).to_string();
    assert!(hello.starts_with("event: hello\ndata: {\"client\":"), "{hello}");

    let mut runtime = bc.subscribe_runtime();
    bc.publish("materials.updated", json!({ "id": 5 })).await;
    let n = client.read(&mut buf).await.expect("read event");
    let frame = String::from_utf8_lossy(&buf[..n]).to_string();
    assert!(frame.starts_with("id: "), "{frame}");
    assert!(frame.ends_with("event: materials.updated\ndata: {\"id\":5}\n\n"), "{frame}");

    conn.cancel();
    served.await.expect("join").expect("clean exit");
    assert_eq!(bc.broker().subscriber_count().await, 0);

    loop {
        let ev = runtime.recv().await.expect("runtime event");
        if ev.kind == EventKind::SubscriberLeft {
            break;
        }
    }
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let bc = Arc::new(Backchannel::new(Config::default()));
    let (client, server) = tokio::io::duplex(4096);

    let bc2 = Arc::clone(&bc);
    let served = tokio::spawn(async move {
        let mut writer = SseWriter::new(server);
        bc2.serve_stream(CancellationToken::new(), &mut writer).await
    });

    let mut client = client;
    let mut buf = vec![0u8; 256];
    client.read(&mut buf).await.expect("read hello");

    bc.shutdown().await;
    served.await.expect("join").expect("clean exit");
    assert_eq!(bc.broker().subscriber_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_is_announced_before_backoff_is_cut_short() {
    let bc = Backchannel::new(Config::default());
    let mut runtime = bc.subscribe_runtime();
    let processor = ProcessorFn::arc("down", |_p: Payload| async {
        Err::<(), _>(ProcessError::retryable("downstream unavailable"))
    });
    let policy = RetryPolicy {
        max_attempts: 3,
        interrupt_backoff: true,
        backoff: BackoffPolicy {
            first: Duration::from_secs(60),
            max: Duration::from_secs(60),
            ..BackoffPolicy::default()
        },
        ..RetryPolicy::default()
    };
    let consumer = bc.start_consumer(processor, policy).await.expect("consumer");

    let never = CancellationToken::new();
    assert_eq!(bc.enqueue("job".into(), &never).await, EnqueueOutcome::Queued);
    loop {
        let ev = runtime.recv().await.expect("runtime event");
        if ev.kind == EventKind::BackoffScheduled {
            break;
        }
    }

    bc.shutdown().await;
    consumer.join().await.expect("consumer task");

    let mut kinds = Vec::new();
    while let Ok(ev) = runtime.try_recv() {
        kinds.push(ev.kind);
    }
    let announced = kinds.iter().position(|k| *k == EventKind::ShutdownRequested);
    let exhausted = kinds.iter().position(|k| *k == EventKind::PayloadExhausted);
    assert!(announced.is_some() && exhausted.is_some(), "{kinds:?}");
    assert!(announced < exhausted, "{kinds:?}");
}
