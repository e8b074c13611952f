//! # Broker: fan-out of events to stream subscribers.
//!
//! The broker keeps one bounded mailbox per live subscriber and copies every
//! broadcast event into each of them without waiting.
//!
//! ## Architecture
//! ```text
//! publish(kind, data)
//!     │
//!     └─► broadcast ── read lock ──┬─► [mailbox 1] ──► serve_stream ──► writer 1
//!                                  ├─► [mailbox 2] ──► serve_stream ──► writer 2
//!                                  └─► [mailbox N] ──► serve_stream ──► writer N
//!
//! serve_stream select! loop:
//!   mailbox event ──► event frame
//!   keepalive tick ──► ping frame
//!   broker shutdown / connection cancelled ──► unsubscribe, return
//! ```
//!
//! ## Rules
//! - **Non-blocking**: a full mailbox loses that event for that subscriber only.
//! - **Per-subscriber FIFO**, no ordering across subscribers.
//! - Mailboxes whose reader is gone are removed on the next broadcast.
//! - A connection loop also stops mid-write, so a client that stopped
//!   reading cannot hold it past shutdown.
//! - After shutdown every operation is a no-op.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broker::event::{Event, hello_frame, ping_frame};
use crate::broker::stream::{Frame, StreamWriter};
use crate::error::StreamError;
use crate::events::{Bus, EventKind, RuntimeEvent};

/// Broker tuning.
#[derive(Clone, Copy, Debug)]
pub struct BrokerConfig {
    /// Events buffered per subscriber before drops start (min 1).
    pub mailbox_capacity: usize,
    /// Interval between `ping` frames (`0s` = no pings).
    pub keepalive: Duration,
}

impl BrokerConfig {
    /// Interval between `ping` frames, `None` when pings are disabled.
    #[inline]
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.keepalive > Duration::ZERO).then_some(self.keepalive)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 16,
            keepalive: Duration::from_secs(25),
        }
    }
}

/// Handle identifying one subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered mailbox.
///
/// `recv` yields `None` once the subscriber was removed or the broker shut down.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    mailbox: mpsc::Receiver<Arc<Event>>,
}

impl Subscription {
    #[inline]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.mailbox.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.mailbox.try_recv().ok()
    }
}

/// Registry of live subscribers.
pub struct Broker {
    clients: RwLock<HashMap<SubscriberId, mpsc::Sender<Arc<Event>>>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
    shutdown: CancellationToken,
    cfg: BrokerConfig,
    bus: Bus,
}

impl Broker {
    pub fn new(cfg: BrokerConfig, bus: Bus) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            cfg: BrokerConfig {
                mailbox_capacity: cfg.mailbox_capacity.max(1),
                ..cfg
            },
            bus,
        }
    }

    /// Registers a new mailbox.
    ///
    /// After shutdown the returned subscription is already closed.
    pub async fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, mailbox) = mpsc::channel(self.cfg.mailbox_capacity);

        let mut clients = self.clients.write().await;
        if self.shutdown.is_cancelled() {
            return Subscription { id, mailbox };
        }
        clients.insert(id, tx);
        let live = clients.len();
        drop(clients);

        self.bus.publish(RuntimeEvent::new(EventKind::SubscriberJoined).with_subscriber(id.0));
        debug!(subscriber = id.0, live, "subscriber joined");
        Subscription { id, mailbox }
    }

    /// Removes a mailbox; its reader sees end-of-stream after draining.
    ///
    /// Returns `false` if `id` was not registered.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.clients.write().await.remove(&id).is_some();
        if removed {
            self.bus.publish(RuntimeEvent::new(EventKind::SubscriberLeft).with_subscriber(id.0));
            debug!(subscriber = id.0, "subscriber left");
        }
        removed
    }

    /// Copies `event` into every mailbox without waiting.
    ///
    /// Returns the number of subscribers that received it.
    pub async fn broadcast(&self, event: Event) -> usize {
        if self.shutdown.is_cancelled() {
            return 0;
        }
        let topic: Arc<str> = event.kind.as_str().into();
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut stale = Vec::new();

        {
            let clients = self.clients.read().await;
            for (id, tx) in clients.iter() {
                let reason = match tx.try_send(Arc::clone(&event)) {
                    Ok(()) => {
                        delivered += 1;
                        continue;
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => "full",
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        stale.push(*id);
                        "closed"
                    }
                };
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.bus.publish(
                    RuntimeEvent::new(EventKind::EventDropped)
                        .with_subscriber(id.0)
                        .with_topic(Arc::clone(&topic))
                        .with_reason(reason),
                );
            }
        }

        for id in stale {
            self.unsubscribe(id).await;
        }
        self.bus
            .publish(RuntimeEvent::new(EventKind::EventPublished).with_topic(topic));
        delivered
    }

    /// Shorthand for `broadcast(Event::new(kind, data))`.
    pub async fn publish(&self, kind: impl Into<String>, data: Value) -> usize {
        self.broadcast(Event::new(kind, data)).await
    }

    /// Stops the broker: every connection loop returns and every mailbox closes.
    ///
    /// Returns `false` if it was already stopped.
    pub async fn shutdown(&self) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        self.shutdown.cancel();
        let drained: Vec<SubscriberId> = {
            let mut clients = self.clients.write().await;
            clients.drain().map(|(id, _)| id).collect()
        };
        for id in &drained {
            self.bus.publish(RuntimeEvent::new(EventKind::SubscriberLeft).with_subscriber(id.0));
        }
        info!(closed = drained.len(), "broker stopped");
        true
    }

    pub async fn subscriber_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Events lost to full or closed mailboxes.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Runs one subscriber's connection until it ends.
    ///
    /// Writes a `hello` frame, then mailbox events and periodic `ping`
    /// frames. Returns `Ok` when `conn` is cancelled, the broker shuts down or
    /// the subscriber is removed, even while a write is stuck on a client that
    /// stopped reading; returns the error when a write fails. The subscriber
    /// is unregistered on every exit, including when this future is dropped.
    pub async fn serve_stream<W>(
        self: &Arc<Self>,
        conn: CancellationToken,
        writer: &mut W,
    ) -> Result<(), StreamError>
    where
        W: StreamWriter + ?Sized,
    {
        let mut sub = self.subscribe().await;
        let id = sub.id();
        let registration = Registration {
            broker: Some(Arc::clone(self)),
            id,
        };
        let res = self.stream_loop(&mut sub, &conn, writer).await;
        registration.release().await;

        if let Err(e) = &res {
            self.bus.publish(
                RuntimeEvent::new(EventKind::StreamFailed)
                    .with_subscriber(id.0)
                    .with_reason(e.to_string()),
            );
            debug!(subscriber = id.0, error = e.as_label(), "stream ended with error");
        }
        res
    }

    async fn stream_loop<W>(
        &self,
        sub: &mut Subscription,
        conn: &CancellationToken,
        writer: &mut W,
    ) -> Result<(), StreamError>
    where
        W: StreamWriter + ?Sized,
    {
        if !self.deliver(conn, writer, &hello_frame(sub.id().0)).await? {
            return Ok(());
        }

        let mut keepalive = self.cfg.ping_interval().map(|period| {
            let mut iv = time::interval_at(Instant::now() + period, period);
            iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
            iv
        });

        loop {
            let frame = tokio::select! {
                _ = conn.cancelled() => return Ok(()),
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = next_tick(&mut keepalive) => ping_frame(),
                ev = sub.recv() => match ev {
                    Some(ev) => ev.to_frame()?,
                    None => return Ok(()),
                },
            };
            if !self.deliver(conn, writer, &frame).await? {
                return Ok(());
            }
        }
    }

    /// Writes `frame` unless the connection or the broker stops first.
    ///
    /// Returns `false` when a stop won the race and the frame was abandoned.
    async fn deliver<W>(
        &self,
        conn: &CancellationToken,
        writer: &mut W,
        frame: &Frame,
    ) -> Result<bool, StreamError>
    where
        W: StreamWriter + ?Sized,
    {
        tokio::select! {
            biased;
            _ = conn.cancelled() => Ok(false),
            _ = self.shutdown.cancelled() => Ok(false),
            res = send(writer, frame) => res.map(|()| true),
        }
    }
}

/// Keeps a subscriber registered while its connection loop runs.
///
/// Dropped without [`Registration::release`] (the loop's future was dropped),
/// it removes the subscriber from a spawned task.
struct Registration {
    broker: Option<Arc<Broker>>,
    id: SubscriberId,
}

impl Registration {
    async fn release(mut self) {
        if let Some(broker) = &self.broker {
            broker.unsubscribe(self.id).await;
        }
        self.broker = None;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let Some(broker) = self.broker.take() else {
            return;
        };
        let id = self.id;
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(async move {
                broker.unsubscribe(id).await;
            });
        }
    }
}

async fn next_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send<W>(writer: &mut W, frame: &Frame) -> Result<(), StreamError>
where
    W: StreamWriter + ?Sized,
{
    writer.write_frame(frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::stream::SseWriter;
    use serde_json::json;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    fn broker(mailbox: usize) -> Arc<Broker> {
        Arc::new(Broker::new(
            BrokerConfig {
                mailbox_capacity: mailbox,
                keepalive: Duration::from_secs(25),
            },
            Bus::new(64),
        ))
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let b = broker(4);
        let s1 = b.subscribe().await;
        let s2 = b.subscribe().await;
        assert_ne!(s1.id(), s2.id());
        assert_eq!(b.subscriber_count().await, 2);

        assert!(b.unsubscribe(s1.id()).await);
        assert!(!b.unsubscribe(s1.id()).await);
        assert_eq!(b.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let b = broker(4);
        let mut s1 = b.subscribe().await;
        let mut s2 = b.subscribe().await;

        assert_eq!(b.publish("audit", json!({ "n": 1 })).await, 2);
        assert_eq!(s1.recv().await.expect("s1").data, json!({ "n": 1 }));
        assert_eq!(s2.recv().await.expect("s2").kind, "audit");
    }

    #[tokio::test]
    async fn test_no_subscribers_is_noop() {
        let b = broker(4);
        assert_eq!(b.publish("audit", Value::Null).await, 0);
        assert_eq!(b.dropped_events(), 0);
    }

    #[tokio::test]
    async fn test_full_mailbox_drops_for_that_subscriber_only() {
        let b = broker(1);
        let mut slow = b.subscribe().await;
        let mut fast = b.subscribe().await;

        b.publish("e", json!(1)).await;
        assert_eq!(fast.recv().await.expect("e1").data, json!(1));
        b.publish("e", json!(2)).await;
        assert_eq!(fast.recv().await.expect("e2").data, json!(2));

        assert_eq!(b.dropped_events(), 1);
        assert_eq!(slow.recv().await.expect("e1").data, json!(1));
        b.publish("e", json!(3)).await;
        assert_eq!(slow.recv().await.expect("e3").data, json!(3));
        assert!(slow.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_closed_mailbox_is_pruned() {
        let b = broker(4);
        let gone = b.subscribe().await;
        drop(gone);
        b.publish("e", Value::Null).await;
        assert_eq!(b.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_mailboxes() {
        let b = broker(4);
        let mut s = b.subscribe().await;
        assert!(b.shutdown().await);
        assert!(!b.shutdown().await);

        assert!(s.recv().await.is_none());
        assert_eq!(b.publish("e", Value::Null).await, 0);
        let mut late = b.subscribe().await;
        assert!(late.recv().await.is_none());
        assert_eq!(b.subscriber_count().await, 0);
    }

    fn frames() -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        mpsc::channel(16)
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_stream_writes_hello_events_and_pings() {
        let b = broker(4);
        let (mut tx, mut rx) = frames();
        let conn = CancellationToken::new();

        let (b2, c2) = (Arc::clone(&b), conn.clone());
        let task = tokio::spawn(async move { b2.serve_stream(c2, &mut tx).await });

        let hello = rx.recv().await.expect("hello");
        assert_eq!(&*hello.event, "hello");
        assert_eq!(hello.id, None);
        assert_eq!(b.subscriber_count().await, 1);

        b.publish("audit", json!({ "a": 1 })).await;
        let ev = rx.recv().await.expect("event");
        assert_eq!(&*ev.event, "audit");
        assert!(ev.id.is_some());
        assert_eq!(ev.data, r#"{"a":1}"#);

        let ping = rx.recv().await.expect("ping");
        assert_eq!(&*ping.event, "ping");

        conn.cancel();
        task.await.expect("join").expect("clean exit");
        assert_eq!(b.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_serve_stream_returns_write_error_and_unsubscribes() {
        let b = broker(4);
        let (mut tx, mut rx) = frames();

        let b2 = Arc::clone(&b);
        let task =
            tokio::spawn(async move { b2.serve_stream(CancellationToken::new(), &mut tx).await });
        rx.recv().await.expect("hello");
        drop(rx);

        b.publish("audit", Value::Null).await;
        let err = task.await.expect("join").unwrap_err();
        assert_eq!(err.as_label(), "stream_io");
        assert_eq!(b.subscriber_count().await, 0);
    }

    /// A connection whose client never reads, parked inside a frame write.
    async fn stalled_stream(
        b: &Arc<Broker>,
        conn: CancellationToken,
    ) -> (JoinHandle<Result<(), StreamError>>, DuplexStream) {
        let (client, server) = tokio::io::duplex(64);
        let b2 = Arc::clone(b);
        let task = tokio::spawn(async move {
            let mut writer = SseWriter::new(server);
            b2.serve_stream(conn, &mut writer).await
        });
        while b.subscriber_count().await == 0 {
            tokio::task::yield_now().await;
        }
        b.publish("bulk", json!({ "blob": "x".repeat(4096) })).await;
        time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished(), "write should be parked on the full pipe");
        (task, client)
    }

    #[tokio::test]
    async fn test_stalled_writer_ends_on_connection_cancel() {
        let b = broker(4);
        let conn = CancellationToken::new();
        let (task, _client) = stalled_stream(&b, conn.clone()).await;

        conn.cancel();
        time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop returned")
            .expect("join")
            .expect("clean exit");
        assert_eq!(b.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_stalled_writer_ends_on_broker_shutdown() {
        let b = broker(4);
        let (task, _client) = stalled_stream(&b, CancellationToken::new()).await;

        b.shutdown().await;
        time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop returned")
            .expect("join")
            .expect("clean exit");
    }

    #[tokio::test]
    async fn test_dropped_connection_future_unsubscribes() {
        let b = broker(4);
        let (mut tx, mut rx) = frames();

        let b2 = Arc::clone(&b);
        let task =
            tokio::spawn(async move { b2.serve_stream(CancellationToken::new(), &mut tx).await });
        rx.recv().await.expect("hello");
        assert_eq!(b.subscriber_count().await, 1);

        task.abort();
        assert!(task.await.expect_err("aborted").is_cancelled());
        for _ in 0..100 {
            if b.subscriber_count().await == 0 {
                break;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(b.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_serve_stream_ends_on_broker_shutdown() {
        let b = broker(4);
        let (mut tx, mut rx) = frames();

        let b2 = Arc::clone(&b);
        let task =
            tokio::spawn(async move { b2.serve_stream(CancellationToken::new(), &mut tx).await });
        rx.recv().await.expect("hello");

        b.shutdown().await;
        task.await.expect("join").expect("clean exit");
        assert_eq!(b.subscriber_count().await, 0);
    }
}
