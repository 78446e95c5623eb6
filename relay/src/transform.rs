//! Message text transforms.
//!
//! Pure functions for caps normalization, emoji collapsing, template
//! rendering, and truncation, plus the emoji shortcode map which is
//! reloaded wholesale from `emoji-mappings.json` on a timer so dashboard
//! edits are picked up without a restart.

use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Matches one `:shortcode:` span.
static SHORTCODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":[a-zA-Z0-9_-]+:").unwrap());

/// Collapses runs of spaces left behind by shortcode removal.
static MULTI_SPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"  +").unwrap());

/// Maximum unique shortcodes kept by [`collapse_emojis`].
pub const MAX_UNIQUE_EMOJIS: usize = 5;

/// Shortcode map with timed wholesale reload.
pub struct EmojiTransformer {
    file_path: PathBuf,
    mappings: HashMap<String, String>,
    last_reload: Option<Instant>,
    reload_interval: Duration,
}

impl EmojiTransformer {
    pub fn new(data_dir: impl AsRef<Path>, reload_interval: Duration) -> Self {
        Self {
            file_path: data_dir.as_ref().join("emoji-mappings.json"),
            mappings: HashMap::new(),
            last_reload: None,
            reload_interval,
        }
    }

    /// Reload the mapping file, replacing the map wholesale.
    ///
    /// A missing file yields an empty map; an unparseable file keeps the
    /// previous map and retries at the next interval.
    pub fn reload(&mut self) {
        match std::fs::read_to_string(&self.file_path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(mappings) => {
                    debug!(count = mappings.len(), "emoji mappings loaded");
                    self.mappings = mappings;
                    self.last_reload = Some(Instant::now());
                }
                Err(e) => {
                    warn!(path = %self.file_path.display(), error = %e, "failed to parse emoji mappings");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.mappings = HashMap::new();
                self.last_reload = Some(Instant::now());
            }
            Err(e) => {
                warn!(path = %self.file_path.display(), error = %e, "failed to read emoji mappings");
            }
        }
    }

    /// Reload when the interval has elapsed since the last reload.
    pub fn reload_if_needed(&mut self) {
        let due = match self.last_reload {
            Some(at) => at.elapsed() >= self.reload_interval,
            None => true,
        };
        if due {
            self.reload();
        }
    }

    /// Replace mapped shortcodes; unmapped shortcodes pass through.
    pub fn convert(&self, message: &str) -> String {
        if self.mappings.is_empty() {
            return message.to_string();
        }

        SHORTCODE_REGEX
            .replace_all(message, |caps: &regex::Captures| {
                let shortcode = caps.get(0).unwrap().as_str();
                self.mappings
                    .get(shortcode)
                    .cloned()
                    .unwrap_or_else(|| shortcode.to_string())
            })
            .into_owned()
    }

    #[cfg(test)]
    fn with_mappings(mappings: HashMap<String, String>) -> Self {
        Self {
            file_path: PathBuf::from("emoji-mappings.json"),
            mappings,
            last_reload: None,
            reload_interval: Duration::from_secs(300),
        }
    }
}

/// Uppercase the first character of a message.
pub fn capitalize_first(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase an all-caps message.
///
/// Only alphabetic characters outside shortcode spans are considered;
/// the message is lowercased when at least two such characters exist and
/// every one of them is uppercase.
pub fn normalize_caps(message: &str) -> String {
    let without_shortcodes = SHORTCODE_REGEX.replace_all(message, "");
    let alpha: Vec<char> = without_shortcodes.chars().filter(|c| c.is_alphabetic()).collect();

    if alpha.len() >= 2 && alpha.iter().all(|c| c.is_uppercase()) {
        message.to_lowercase()
    } else {
        message.to_string()
    }
}

/// Collapse duplicate shortcodes and bound the unique count.
///
/// Duplicates (consecutive or scattered) collapse to `:x: xN`; at most
/// `max_unique` unique shortcodes survive, extras are stripped; a space
/// is inserted between text and a jammed shortcode; leftover space runs
/// are squeezed. Applying the function to its own output is a no-op.
pub fn collapse_emojis(message: &str, max_unique: usize) -> String {
    let all: Vec<&str> = SHORTCODE_REGEX
        .find_iter(message)
        .map(|m| m.as_str())
        .collect();
    if all.is_empty() {
        return message.to_string();
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for &emoji in &all {
        *counts.entry(emoji).or_insert(0) += 1;
    }

    let mut seen: Vec<String> = Vec::new();
    let replaced = SHORTCODE_REGEX.replace_all(message, |caps: &regex::Captures| {
        let emoji = caps.get(0).unwrap().as_str();
        if seen.iter().any(|s| s.as_str() == emoji) {
            return String::new();
        }
        if seen.len() >= max_unique {
            return String::new();
        }
        seen.push(emoji.to_string());
        let count = counts[emoji];
        if count > 1 {
            format!("{} x{} ", emoji, count)
        } else {
            emoji.to_string()
        }
    });

    let spaced = space_out_shortcodes(&replaced);
    MULTI_SPACE_REGEX
        .replace_all(&spaced, " ")
        .trim()
        .to_string()
}

/// Insert a space between non-whitespace text and a jammed shortcode.
fn space_out_shortcodes(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 8);
    let mut last = 0;
    for m in SHORTCODE_REGEX.find_iter(message) {
        out.push_str(&message[last..m.start()]);
        if out.chars().next_back().is_some_and(|c| !c.is_whitespace()) {
            out.push(' ');
        }
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&message[last..]);
    out
}

/// Render the outbound template.
pub fn render_template(template: &str, author: &str, message: &str) -> String {
    template
        .replace("{author}", author)
        .replace("{message}", message)
}

/// Truncate to `max_len` characters, ending with `...` when truncated.
pub fn truncate(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        return message.to_string();
    }
    let kept: String = message.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformer(pairs: &[(&str, &str)]) -> EmojiTransformer {
        EmojiTransformer::with_mappings(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_convert_replaces_mapped_shortcodes() {
        let emoji = transformer(&[(":thumbsup:", "\u{1F44D}"), (":heart:", "\u{2764}\u{FE0F}")]);

        let result = emoji.convert("I :heart: this :thumbsup:");

        assert_eq!(result, "I \u{2764}\u{FE0F} this \u{1F44D}");
    }

    #[test]
    fn test_convert_leaves_unmapped_shortcodes() {
        let emoji = transformer(&[(":thumbsup:", "\u{1F44D}")]);

        assert_eq!(
            emoji.convert("Check :unknown_emoji: out"),
            "Check :unknown_emoji: out"
        );
    }

    #[test]
    fn test_convert_strips_shortcodes_mapped_to_empty() {
        let emoji = transformer(&[(":yt:", ""), (":oops:", "")]);

        assert_eq!(emoji.convert("Hello :yt: world :oops:"), "Hello  world ");
    }

    #[test]
    fn test_convert_without_mappings_is_identity() {
        let emoji = transformer(&[]);

        assert_eq!(emoji.convert("No emojis here"), "No emojis here");
    }

    #[test]
    fn test_reload_missing_file_yields_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let mut emoji = EmojiTransformer::new(dir.path(), Duration::from_secs(300));

        emoji.reload();

        assert!(emoji.mappings.is_empty());
        assert!(emoji.last_reload.is_some());
    }

    #[test]
    fn test_reload_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("emoji-mappings.json"),
            r#"{":test:": "TestVal"}"#,
        )
        .unwrap();
        let mut emoji = EmojiTransformer::new(dir.path(), Duration::from_secs(300));

        emoji.reload();

        assert_eq!(emoji.mappings.get(":test:").map(String::as_str), Some("TestVal"));
    }

    #[test]
    fn test_reload_if_needed_respects_interval() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("emoji-mappings.json"), r#"{":a:": "A"}"#).unwrap();
        let mut emoji = EmojiTransformer::new(dir.path(), Duration::from_secs(300));
        emoji.reload();

        // Map changes on disk, but the interval has not elapsed.
        std::fs::write(dir.path().join("emoji-mappings.json"), r#"{":b:": "B"}"#).unwrap();
        emoji.reload_if_needed();

        assert!(emoji.mappings.contains_key(":a:"));
        assert!(!emoji.mappings.contains_key(":b:"));
    }

    #[test]
    fn test_capitalize_first() {
        assert_eq!(capitalize_first("hello"), "Hello");
        assert_eq!(capitalize_first("Hello"), "Hello");
        assert_eq!(capitalize_first(""), "");
        assert_eq!(capitalize_first("123abc"), "123abc");
    }

    #[test]
    fn test_normalize_caps_lowercases_all_caps() {
        assert_eq!(normalize_caps("HELLO WORLD"), "hello world");
    }

    #[test]
    fn test_normalize_caps_ignores_mixed_case() {
        assert_eq!(normalize_caps("Hello WORLD"), "Hello WORLD");
    }

    #[test]
    fn test_normalize_caps_needs_two_alpha_chars() {
        // A single letter is not "all caps".
        assert_eq!(normalize_caps("A"), "A");
        assert_eq!(normalize_caps("A1!"), "A1!");
    }

    #[test]
    fn test_normalize_caps_ignores_shortcode_spans() {
        // Shortcodes are lowercase by convention and must not defeat the check.
        assert_eq!(normalize_caps("GG :heart_eyes:"), "gg :heart_eyes:");
        // Only one alphabetic char outside the shortcode: untouched.
        assert_eq!(normalize_caps("A :heart:"), "A :heart:");
    }

    #[test]
    fn test_collapse_emojis_counts_duplicates() {
        assert_eq!(
            collapse_emojis(":heart: :heart: :heart:", MAX_UNIQUE_EMOJIS),
            ":heart: x3"
        );
    }

    #[test]
    fn test_collapse_emojis_is_idempotent() {
        let once = collapse_emojis(":fire: :fire: nice :fire:", MAX_UNIQUE_EMOJIS);
        let twice = collapse_emojis(&once, MAX_UNIQUE_EMOJIS);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_collapse_emojis_limits_unique_count() {
        let message = ":a: :b: :c: :d: :e: :f: :g:";

        let result = collapse_emojis(message, MAX_UNIQUE_EMOJIS);

        assert_eq!(result, ":a: :b: :c: :d: :e:");
    }

    #[test]
    fn test_collapse_emojis_spaces_out_jammed_shortcodes() {
        assert_eq!(collapse_emojis("Mom:heart:", MAX_UNIQUE_EMOJIS), "Mom :heart:");
    }

    #[test]
    fn test_collapse_emojis_without_shortcodes_is_identity() {
        assert_eq!(collapse_emojis("plain text", MAX_UNIQUE_EMOJIS), "plain text");
    }

    #[test]
    fn test_render_template() {
        let rendered = render_template("[YT] {author}: {message}", "Alice", "hi");

        assert_eq!(rendered, "[YT] Alice: hi");
    }

    #[test]
    fn test_truncate_short_message_untouched() {
        assert_eq!(truncate("short", 500), "short");
    }

    #[test]
    fn test_truncate_caps_length_and_appends_marker() {
        let long = "x".repeat(600);

        let result = truncate(&long, 500);

        assert_eq!(result.chars().count(), 500);
        assert!(result.ends_with("..."));
    }
}
