//! Blocked-term moderation filter.
//!
//! The block list is a JSON array of strings maintained externally
//! (dashboard or by hand). Entries written as `/pattern/flags` compile to
//! regexes (`i` is the only recognized flag); everything else matches as
//! a case-insensitive literal substring. The list is reloaded wholesale
//! when the file's mtime changes, never patched in place.

use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{info, warn};

/// Result of a block check: the matched fragment, if any.
pub type BlockMatch<'a> = Option<&'a str>;

/// Literal + regex block list with change-triggered reload.
pub struct ModerationFilter {
    file_path: PathBuf,
    terms: Vec<String>,
    regexes: Vec<Regex>,
    last_check: Option<Instant>,
    source_mtime: Option<SystemTime>,
}

impl ModerationFilter {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            file_path: data_dir.as_ref().join("blacklist.json"),
            terms: Vec::new(),
            regexes: Vec::new(),
            last_check: None,
            source_mtime: None,
        }
    }

    /// Total number of loaded entries.
    pub fn len(&self) -> usize {
        self.terms.len() + self.regexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.regexes.is_empty()
    }

    /// Load the block list, replacing both sets wholesale.
    ///
    /// A missing file clears the list; a malformed file keeps the
    /// previous list.
    pub fn load(&mut self) {
        self.last_check = Some(Instant::now());
        self.source_mtime = std::fs::metadata(&self.file_path)
            .and_then(|m| m.modified())
            .ok();

        let raw = match std::fs::read_to_string(&self.file_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no blacklist file found, no terms loaded");
                self.terms = Vec::new();
                self.regexes = Vec::new();
                return;
            }
            Err(e) => {
                warn!(path = %self.file_path.display(), error = %e, "failed to read blacklist");
                return;
            }
        };

        let entries: Vec<String> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.file_path.display(), error = %e, "failed to parse blacklist");
                return;
            }
        };

        let (terms, regexes) = parse_entries(&entries);
        info!(
            total = terms.len() + regexes.len(),
            literals = terms.len(),
            patterns = regexes.len(),
            "loaded blacklist entries"
        );
        self.terms = terms;
        self.regexes = regexes;
    }

    /// Check a message against the block list.
    ///
    /// Literal terms are checked first (case-insensitive substring, first
    /// match wins), then regexes in declaration order. Returns the
    /// matched term or the matched pattern's source text.
    pub fn is_blocked(&self, message: &str) -> BlockMatch<'_> {
        if self.is_empty() {
            return None;
        }

        let lowered = message.to_lowercase();
        for term in &self.terms {
            if lowered.contains(term.as_str()) {
                return Some(term);
            }
        }

        for regex in &self.regexes {
            if regex.is_match(message) {
                return Some(regex.as_str());
            }
        }

        None
    }

    /// Reload when the refresh interval has elapsed AND the file changed.
    ///
    /// A non-positive interval disables refreshing entirely.
    pub fn refresh_if_needed(&mut self, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        if let Some(at) = self.last_check
            && at.elapsed() < interval
        {
            return;
        }
        self.last_check = Some(Instant::now());

        let Ok(mtime) = std::fs::metadata(&self.file_path).and_then(|m| m.modified()) else {
            return;
        };
        if Some(mtime) == self.source_mtime {
            return;
        }

        let old_count = self.len();
        self.load();
        let new_count = self.len();
        if new_count != old_count {
            info!(old_count, new_count, "blacklist updated");
        }
    }
}

/// Split raw entries into lowercase literals and compiled regexes.
///
/// Blank entries are skipped; invalid patterns are logged and skipped.
fn parse_entries(entries: &[String]) -> (Vec<String>, Vec<Regex>) {
    let mut terms = Vec::new();
    let mut regexes = Vec::new();

    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        if let Some(rest) = entry.strip_prefix('/') {
            let Some(last_slash) = rest.rfind('/') else {
                continue;
            };
            if last_slash == 0 {
                continue;
            }
            let pattern = &rest[..last_slash];
            let flags = &rest[last_slash + 1..];

            match RegexBuilder::new(pattern)
                .case_insensitive(flags.contains('i'))
                .build()
            {
                Ok(regex) => regexes.push(regex),
                Err(e) => {
                    warn!(entry = %entry, error = %e, "invalid blacklist regex, skipping");
                }
            }
        } else {
            terms.push(entry.to_lowercase());
        }
    }

    (terms, regexes)
}
