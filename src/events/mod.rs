//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to report
//! queue, executor and broker activity to observers.
//!
//! ## Contents
//! - [`EventKind`], [`RuntimeEvent`] event classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! Not to be confused with [`Event`](crate::Event), which is the
//! application notification pushed to stream subscribers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{EventKind, RuntimeEvent};
