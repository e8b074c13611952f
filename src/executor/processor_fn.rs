//! # Function-backed processor (`ProcessorFn`)
//!
//! [`ProcessorFn`] wraps a closure `F: Fn(Payload) -> Fut`, producing a fresh
//! future per attempt. The payload is a cheap clone, so the future owns it.
//! Shared state goes into the closure explicitly (`Arc<...>`).
//!
//! ## Example
//! ```rust
//! use backchannel::{Payload, ProcessError, ProcessorFn, ProcessorRef};
//!
//! let p: ProcessorRef = ProcessorFn::arc("audit", |payload: Payload| async move {
//!     if payload.is_empty() {
//!         return Err(ProcessError::permanent("empty"));
//!     }
//!     Ok(())
//! });
//!
//! assert_eq!(p.name(), "audit");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProcessError;
use crate::executor::processor::Processor;
use crate::payload::Payload;

/// Function-backed processor.
#[derive(Debug)]
pub struct ProcessorFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ProcessorFn<F> {
    /// Prefer [`ProcessorFn::arc`] when you immediately need a [`ProcessorRef`](crate::ProcessorRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Processor for ProcessorFn<F>
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, payload: &Payload) -> Result<(), ProcessError> {
        (self.f)(payload.clone()).await
    }
}
