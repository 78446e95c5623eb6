//! Chat event type produced by the polling loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat message parsed from a live-chat poll response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Display name of the author.
    pub author: String,
    /// Message text with emoji shortcodes rendered inline.
    pub text: String,
    /// Timestamp at which the relay received the message.
    pub received_at: DateTime<Utc>,
}

impl ChatEvent {
    /// Create a new event stamped with the current time.
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_event_new() {
        let event = ChatEvent::new("Alice", "hello");

        assert_eq!(event.author, "Alice");
        assert_eq!(event.text, "hello");
    }
}
