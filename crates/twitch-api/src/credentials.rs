//! Credential pair and the shared token file.
//!
//! Several cooperating processes (the relay, a main bot, a dashboard) may
//! refresh the same OAuth credential. Whoever refreshes last writes
//! `tokens.json`; everyone else reads it before spending their own
//! refresh token on an exchange.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;

/// An OAuth access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

/// File-backed credential store shared between processes.
#[derive(Debug, Clone)]
pub struct SharedTokenStore {
    path: PathBuf,
}

impl SharedTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential.
    ///
    /// A missing or unparseable file yields `None`; a peer process may not
    /// have written it yet.
    pub fn load(&self) -> Option<Credential> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no shared token file");
                return None;
            }
        };

        match serde_json::from_str::<Credential>(&raw) {
            Ok(credential) if !credential.access_token.is_empty() => Some(credential),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "invalid shared token file");
                None
            }
        }
    }

    /// Persist a refreshed credential for peer processes.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| crate::Error::parse(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "shared token file updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SharedTokenStore::new(dir.path().join("tokens.json"));

        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SharedTokenStore::new(dir.path().join("tokens.json"));
        let credential = Credential::new("access123", Some("refresh456".to_string()));

        store.save(&credential).unwrap();

        assert_eq!(store.load(), Some(credential));
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "not json").unwrap();
        let store = SharedTokenStore::new(&path);

        assert!(store.load().is_none());
    }

    #[test]
    fn test_load_rejects_empty_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, r#"{"access_token": ""}"#).unwrap();
        let store = SharedTokenStore::new(&path);

        assert!(store.load().is_none());
    }
}
