//! Queue consumer: processors, the retry executor and its handle.
//!
//! - [`Processor`] / [`ProcessorFn`] / [`ProcessorRef`] define what happens to a payload.
//! - [`RetryExecutor`] applies the [`RetryPolicy`](crate::RetryPolicy).
//! - [`ConsumerHandle`] exposes the [`ErrorStream`] of [`ExhaustedPayload`] reports.

mod handle;
mod processor;
mod processor_fn;
mod retry_executor;

pub use handle::{ConsumerHandle, ErrorStream, ExhaustedPayload};
pub use processor::{Processor, ProcessorRef};
pub use processor_fn::ProcessorFn;
pub use retry_executor::RetryExecutor;
