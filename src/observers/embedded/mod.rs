//! # Built-in observers
//!
//! - [`LogWriter`]: forwards runtime events to `tracing` (feature `logging`).

mod log;

pub use log::LogWriter;
