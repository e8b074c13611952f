//! # Opaque work item carried by the queue.
//!
//! [`Payload`] is an immutable byte buffer behind an `Arc`, so the executor can
//! hand the same bytes to every attempt and to the dead-letter sink without copying.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Uninterpreted bytes; decoding is the processor's concern.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Payload(Arc<[u8]>);

impl Payload {
    /// Wraps the given bytes.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Borrowed view of the bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Self(v.into())
    }
}

impl From<&[u8]> for Payload {
    fn from(v: &[u8]) -> Self {
        Self(v.into())
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Self::from(v.into_bytes())
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Self::from(v.as_bytes())
    }
}

impl fmt::Debug for Payload {
    /// Shows at most 64 bytes, lossily decoded.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 64;
        let head = &self.0[..self.0.len().min(PREVIEW)];
        let ellipsis = if self.0.len() > PREVIEW { "…" } else { "" };
        write!(
            f,
            "Payload({} bytes: {:?}{ellipsis})",
            self.0.len(),
            String::from_utf8_lossy(head)
        )
    }
}
