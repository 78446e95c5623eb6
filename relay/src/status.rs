//! Source-side liveness indicator.
//!
//! A cooperating process writes `stream-status.json`, mapping channel
//! names to objects with a `live` flag. The relay treats "any channel
//! live" as live. Unlike the destination-side probe, this check fails
//! closed: a missing or unreadable file means offline, because the file
//! is written locally and its absence is meaningful.

use serde_json::Value;
use std::path::{Path, PathBuf};

/// Reader for the shared stream-status file.
#[derive(Debug, Clone)]
pub struct StreamStatusFile {
    path: PathBuf,
}

impl StreamStatusFile {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join("stream-status.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether any tracked channel is currently live.
    pub fn is_live(&self) -> bool {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return false;
        };
        let Ok(data) = serde_json::from_str::<Value>(&raw) else {
            return false;
        };

        data.as_object().is_some_and(|channels| {
            channels.values().any(|info| {
                info.get("live")
                    .and_then(|l| l.as_bool())
                    .unwrap_or(false)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with(body: &str) -> (tempfile::TempDir, StreamStatusFile) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stream-status.json"), body).unwrap();
        let status = StreamStatusFile::new(dir.path());
        (dir, status)
    }

    #[test]
    fn test_missing_file_means_offline() {
        let dir = tempfile::tempdir().unwrap();
        let status = StreamStatusFile::new(dir.path());

        assert!(!status.is_live());
    }

    #[test]
    fn test_invalid_json_means_offline() {
        let (_dir, status) = status_with("not json");

        assert!(!status.is_live());
    }

    #[test]
    fn test_any_live_channel_means_live() {
        let (_dir, status) = status_with(r#"{"chan_a": {"live": false}, "chan_b": {"live": true}}"#);

        assert!(status.is_live());
    }

    #[test]
    fn test_all_offline_means_offline() {
        let (_dir, status) = status_with(r#"{"chan_a": {"live": false}, "chan_b": {"title": "x"}}"#);

        assert!(!status.is_live());
    }
}
