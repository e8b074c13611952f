//! # Processor abstraction.
//!
//! A [`Processor`] handles one payload per call. The executor owns retrying,
//! backoff and dead-lettering; the processor only classifies its failure:
//! [`ProcessError::Retryable`] to try again later, [`ProcessError::Permanent`]
//! to give up immediately.
//!
//! The shared handle type is [`ProcessorRef`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProcessError;
use crate::payload::Payload;

/// # Handles one payload.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use backchannel::{Payload, ProcessError, Processor};
///
/// struct Audit;
///
/// #[async_trait]
/// impl Processor for Audit {
///     fn name(&self) -> &str { "audit" }
///
///     async fn process(&self, payload: &Payload) -> Result<(), ProcessError> {
///         if payload.is_empty() {
///             return Err(ProcessError::permanent("empty payload"));
///         }
///         // write the row...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Stable name used in logs.
    fn name(&self) -> &str {
        "processor"
    }

    /// Processes one payload. Called again for the same payload on retry.
    async fn process(&self, payload: &Payload) -> Result<(), ProcessError>;
}

/// Shared handle to a processor.
pub type ProcessorRef = Arc<dyn Processor>;
