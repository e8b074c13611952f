//! Error types used by the queue, the retry executor, the broker and config loading.
//!
//! - [`ProcessError`] outcome of one processing attempt (tagged: retryable vs permanent).
//! - [`QueueError`] non-blocking queue operations and consumer ownership.
//! - [`StreamError`] transport failures while serving a subscriber stream.
//! - [`ConfigError`] malformed configuration values.
//!
//! Every enum provides `as_label` (stable snake_case for logs/metrics).

use thiserror::Error;

/// # Outcome of a failed processing attempt.
///
/// The executor decides the payload's fate from the variant:
/// `Retryable` and `Panicked` consume retry budget, `Permanent` goes straight
/// to the dead-letter sink, `Interrupted` is produced by the executor itself
/// when shutdown cuts a backoff short.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// Failure that may succeed if retried (I/O, database, downstream timeouts).
    #[error("processing failed: {reason}")]
    Retryable {
        /// The underlying error message.
        reason: String,
    },

    /// Failure that will never succeed (malformed payload, rejected record).
    #[error("permanent failure (no retry): {reason}")]
    Permanent {
        /// The underlying error message.
        reason: String,
    },

    /// Backoff sleep was cut short by shutdown.
    #[error("backoff interrupted by shutdown after attempt {attempt}")]
    Interrupted {
        /// Last attempt that ran before the interruption.
        attempt: u32,
    },

    /// Processor panicked during the attempt.
    #[error("processor panicked: {info}")]
    Panicked {
        /// Panic message, if it could be extracted.
        info: String,
    },
}

impl ProcessError {
    /// Shorthand for [`ProcessError::Retryable`].
    pub fn retryable(reason: impl ToString) -> Self {
        ProcessError::Retryable {
            reason: reason.to_string(),
        }
    }

    /// Shorthand for [`ProcessError::Permanent`].
    pub fn permanent(reason: impl ToString) -> Self {
        ProcessError::Permanent {
            reason: reason.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use backchannel::ProcessError;
    ///
    /// assert_eq!(ProcessError::permanent("bad json").as_label(), "process_permanent");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::Retryable { .. } => "process_retryable",
            ProcessError::Permanent { .. } => "process_permanent",
            ProcessError::Interrupted { .. } => "process_interrupted",
            ProcessError::Panicked { .. } => "process_panicked",
        }
    }

    /// Indicates whether another attempt may be scheduled for this error.
    ///
    /// # Example
    /// ```
    /// use backchannel::ProcessError;
    ///
    /// assert!(ProcessError::retryable("db down").is_retryable());
    /// assert!(!ProcessError::permanent("bad json").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessError::Retryable { .. } | ProcessError::Panicked { .. }
        )
    }
}

impl From<serde_json::Error> for ProcessError {
    /// Decoding failures never heal on retry.
    fn from(err: serde_json::Error) -> Self {
        ProcessError::permanent(format!("decode: {err}"))
    }
}

/// # Errors from queue operations that do not wait.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("queue is full")]
    Full,

    /// The queue was shut down.
    #[error("queue is closed")]
    Closed,

    /// The single consumer slot was already taken.
    #[error("queue consumer already started")]
    ConsumerTaken,
}

impl QueueError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Full => "queue_full",
            QueueError::Closed => "queue_closed",
            QueueError::ConsumerTaken => "queue_consumer_taken",
        }
    }
}

/// # Errors raised while writing a subscriber stream.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StreamError {
    /// The transport rejected a write or flush (client went away).
    #[error("stream write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Event data could not be serialized.
    #[error("event encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StreamError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::Io(_) => "stream_io",
            StreamError::Encode(_) => "stream_encode",
        }
    }
}

/// # Errors raised while loading configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is present but cannot be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value as found.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}
