//! # Stream framing.
//!
//! A connection loop writes [`Frame`]s through a [`StreamWriter`]. The HTTP
//! layer decides where the bytes go:
//!
//! - [`SseWriter`] renders Server-Sent Events over any `AsyncWrite`;
//! - `mpsc::Sender<Frame>` hands frames to a framework that does its own
//!   encoding (e.g. a response body built from a stream).
//!
//! An HTTP handler should respond with [`SSE_HEADERS`] before the first frame.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::StreamError;

/// Response headers for an SSE endpoint.
pub const SSE_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
    ("X-Accel-Buffering", "no"),
];

/// One unit written to a subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Event sequence; absent for `hello` and `ping`.
    pub id: Option<u64>,
    pub event: Arc<str>,
    /// JSON text.
    pub data: String,
}

impl Frame {
    /// Renders the frame in SSE wire format.
    ///
    /// ```
    /// use backchannel::Frame;
    ///
    /// let f = Frame { id: Some(4), event: "audit".into(), data: "{}".into() };
    /// assert_eq!(f.to_sse(), "id: 4\nevent: audit\ndata: {}\n\n");
    /// ```
    pub fn to_sse(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + self.event.len() + 32);
        if let Some(id) = self.id {
            out.push_str("id: ");
            out.push_str(&id.to_string());
            out.push('\n');
        }
        out.push_str("event: ");
        out.push_str(&self.event);
        out.push('\n');
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line.strip_suffix('\r').unwrap_or(line));
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Destination of one subscriber's frames.
#[async_trait]
pub trait StreamWriter: Send {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), StreamError>;

    /// Pushes buffered frames to the client.
    async fn flush(&mut self) -> Result<(), StreamError>;
}

/// SSE over a tokio writer.
#[derive(Debug)]
pub struct SseWriter<W> {
    inner: W,
}

impl<W> SseWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W> StreamWriter for SseWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), StreamError> {
        self.inner.write_all(frame.to_sse().as_bytes()).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        self.inner.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl StreamWriter for mpsc::Sender<Frame> {
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), StreamError> {
        self.send(frame.clone()).await.map_err(|_| {
            StreamError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "frame receiver dropped",
            ))
        })
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_without_id() {
        let f = Frame {
            id: None,
            event: "ping".into(),
            data: "1700000000".into(),
        };
        assert_eq!(f.to_sse(), "event: ping\ndata: 1700000000\n\n");
    }

    #[test]
    fn test_multiline_data_is_split() {
        let f = Frame {
            id: Some(1),
            event: "note".into(),
            data: "a\r\nb\nc".into(),
        };
        assert_eq!(f.to_sse(), "id: 1\nevent: note\ndata: a\ndata: b\ndata: c\n\n");
    }

    #[tokio::test]
    async fn test_sse_writer_writes_bytes() {
        let mut w = SseWriter::new(Vec::new());
        let f = Frame {
            id: Some(9),
            event: "audit".into(),
            data: r#"{"ok":true}"#.into(),
        };
        w.write_frame(&f).await.expect("write");
        w.flush().await.expect("flush");
        assert_eq!(
            String::from_utf8(w.into_inner()).expect("utf8"),
            "id: 9\nevent: audit\ndata: {\"ok\":true}\n\n"
        );
    }

    #[tokio::test]
    async fn test_channel_writer_fails_when_receiver_dropped() {
        let (mut tx, rx) = mpsc::channel::<Frame>(1);
        drop(rx);
        let f = Frame {
            id: None,
            event: "ping".into(),
            data: "0".into(),
        };
        let err = tx.write_frame(&f).await.unwrap_err();
        assert_eq!(err.as_label(), "stream_io");
    }
}
