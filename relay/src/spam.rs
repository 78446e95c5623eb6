//! Per-author spam suppression.
//!
//! Sliding-window rate limiting plus duplicate detection, keyed by author
//! display name. All state lives on the consumer side of the relay, so no
//! synchronization is needed; a periodic cleanup drops authors that have
//! gone quiet.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Spam guard tunables.
#[derive(Debug, Clone)]
pub struct SpamGuardConfig {
    /// Window over which per-author sends are counted.
    pub rate_window: Duration,
    /// Maximum sends per author per window.
    pub rate_limit: usize,
    /// Window within which an identical repeat is dropped.
    pub duplicate_window: Duration,
}

impl Default for SpamGuardConfig {
    fn default() -> Self {
        Self {
            rate_window: Duration::from_secs(30),
            rate_limit: 3,
            duplicate_window: Duration::from_secs(30),
        }
    }
}

/// Sliding-window rate limiter and duplicate detector.
pub struct SpamGuard {
    config: SpamGuardConfig,
    timestamps: HashMap<String, Vec<Instant>>,
    last_message: HashMap<String, (String, Instant)>,
}

impl SpamGuard {
    pub fn new(config: SpamGuardConfig) -> Self {
        Self {
            config,
            timestamps: HashMap::new(),
            last_message: HashMap::new(),
        }
    }

    /// Check whether the author has exhausted their send budget.
    ///
    /// The triggering message is itself blocked: when the pruned window
    /// already holds `rate_limit` entries the new timestamp is NOT
    /// recorded, so blocked messages do not extend the author's penalty.
    pub fn is_rate_limited(&mut self, author: &str) -> bool {
        self.rate_limited_at(author, Instant::now())
    }

    fn rate_limited_at(&mut self, author: &str, now: Instant) -> bool {
        let window = self.config.rate_window;
        let entry = self.timestamps.entry(author.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < window);

        if entry.len() >= self.config.rate_limit {
            return true;
        }

        entry.push(now);
        false
    }

    /// Check whether this exact text repeats the author's previous message
    /// within the duplicate window. The new text always becomes the
    /// author's latest message unless it was a duplicate.
    pub fn is_duplicate(&mut self, author: &str, text: &str) -> bool {
        self.duplicate_at(author, text, Instant::now())
    }

    fn duplicate_at(&mut self, author: &str, text: &str, now: Instant) -> bool {
        if let Some((last_text, last_time)) = self.last_message.get(author)
            && last_text == text
            && now.duration_since(*last_time) < self.config.duplicate_window
        {
            return true;
        }

        self.last_message
            .insert(author.to_string(), (text.to_string(), now));
        false
    }

    /// Drop authors whose tracked activity has aged out of both windows.
    pub fn cleanup(&mut self) {
        self.cleanup_at(Instant::now());
    }

    fn cleanup_at(&mut self, now: Instant) {
        let rate_window = self.config.rate_window;
        let duplicate_window = self.config.duplicate_window;
        let before = self.timestamps.len() + self.last_message.len();

        self.timestamps.retain(|_, stamps| {
            stamps
                .last()
                .is_some_and(|newest| now.duration_since(*newest) < rate_window)
        });
        self.last_message
            .retain(|_, (_, at)| now.duration_since(*at) <= duplicate_window);

        let after = self.timestamps.len() + self.last_message.len();
        if after < before {
            debug!(removed = before - after, "pruned stale spam state");
        }
    }

    /// Number of authors currently tracked by either map.
    pub fn tracked_authors(&self) -> usize {
        self.timestamps.len().max(self.last_message.len())
    }
}
