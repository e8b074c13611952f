//! Realtime fan-out to stream subscribers.
//!
//! - [`Broker`] registry of bounded mailboxes, broadcast and connection loop
//! - [`Event`] what is broadcast
//! - [`Frame`] / [`StreamWriter`] / [`SseWriter`] how it reaches the client

mod event;
mod registry;
mod stream;

pub use event::Event;
pub use registry::{Broker, BrokerConfig, SubscriberId, Subscription};
pub use stream::{Frame, SSE_HEADERS, SseWriter, StreamWriter};
