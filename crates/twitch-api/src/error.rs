//! Twitch API error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the Helix / OAuth2 surface.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credential rejected and not refreshable.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Unexpected HTTP status from an API call.
    #[error("unexpected status: {0}")]
    Status(reqwest::StatusCode),

    /// Response body missing an expected field.
    #[error("parse error: {0}")]
    Parse(String),

    /// Token store I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
