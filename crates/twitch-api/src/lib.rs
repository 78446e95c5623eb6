//! Twitch Helix / OAuth2 client for a send-only chat bot.
//!
//! This crate covers the destination side of the relay: token validation
//! and refresh against `id.twitch.tv`, chat message delivery and stream
//! status queries against `api.twitch.tv/helix`, and a file-backed
//! credential store shared with cooperating processes.

pub mod client;
pub mod credentials;
pub mod error;

pub use client::{HelixClient, SendStatus};
pub use credentials::{Credential, SharedTokenStore};
pub use error::{Error, Result};
