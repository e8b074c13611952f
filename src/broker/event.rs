//! Broker events pushed to stream subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Value, json};

use crate::broker::stream::Frame;
use crate::error::StreamError;

static BROKER_SEQ: AtomicU64 = AtomicU64::new(1);

/// One event fanned out to every live subscriber.
///
/// `kind` is free-form (`"users.created"`, `"audit"`...). `seq` increases per
/// process and becomes the SSE `id:` line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl Event {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            seq: BROKER_SEQ.fetch_add(1, Ordering::Relaxed),
            kind: kind.into(),
            data,
        }
    }

    /// Builds an event from any serializable value.
    pub fn from_serialize<T: Serialize + ?Sized>(
        kind: impl Into<String>,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_value(data)?))
    }

    /// Renders the event as one stream frame.
    pub fn to_frame(&self) -> Result<Frame, StreamError> {
        Ok(Frame {
            id: Some(self.seq),
            event: self.kind.as_str().into(),
            data: serde_json::to_string(&self.data)?,
        })
    }
}

/// Greeting written once per connection, before any event.
pub(crate) fn hello_frame(subscriber: u64) -> Frame {
    Frame {
        id: None,
        event: "hello".into(),
        data: json!({ "client": subscriber }).to_string(),
    }
}

/// Keepalive carrying the current unix time in seconds.
pub(crate) fn ping_frame() -> Frame {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Frame {
        id: None,
        event: "ping".into(),
        data: now.to_string(),
    }
}
