//! In-memory channels: the work queue and the dead-letter sink.
//!
//! - [`WorkQueue`] bounded FIFO from producers to the single consumer
//! - [`DeadLetterSink`] bounded, non-blocking holding area for exhausted payloads
//!
//! Both are memory-only: anything not yet processed is lost on crash.

mod dead_letter;
mod work_queue;

pub use dead_letter::{DeadLetterSink, DeadLetters};
pub use work_queue::{EnqueueOutcome, WorkQueue};
pub(crate) use work_queue::QueueReceiver;
