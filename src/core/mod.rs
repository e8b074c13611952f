//! Composition root and its configuration.
//!
//! - [`Backchannel`] wires queue, executor, sink, broker and observers;
//! - [`Config`] settings, with `from_env`;
//! - `shutdown` cross-platform signal handling.

mod backchannel;
mod config;
mod shutdown;

pub use backchannel::{Backchannel, BackchannelBuilder};
pub use config::Config;
