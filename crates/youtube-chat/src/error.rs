//! Chat source error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while locating or polling a live chat.
#[derive(Error, Debug)]
pub enum Error {
    /// The channel has no active broadcast.
    #[error("no active broadcast found")]
    NotLive,

    /// A response was missing an expected field or structure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport-level failures (timeouts, connection errors, bad status).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
