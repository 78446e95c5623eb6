//! YouTube live chat collection via the InnerTube polling API.
//!
//! This crate locates the active broadcast of a channel, performs the
//! live-chat handshake, and then polls `get_live_chat` with the server's
//! continuation token, pushing parsed [`ChatEvent`]s onto a bounded channel.
//!
//! ## Core Types
//!
//! - [`ChatEvent`] - A single parsed chat message
//! - [`ChatSource`] - Background polling state machine with reconnect/backoff
//! - [`SourceConfig`] - Tunables for polling and backoff behavior

pub mod error;
pub mod innertube;
pub mod message;
pub mod source;

pub use error::{Error, Result};
pub use message::ChatEvent;
pub use source::{ChatSource, SourceConfig};
