//! Relay configuration loaded from environment variables.
//!
//! Auth material is optional at load time: the relay can bootstrap from
//! the shared token file written by a cooperating process. Everything
//! that identifies the source channel and the destination bot is
//! required, and missing required variables abort startup.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Required environment variables.
const REQUIRED_VARS: [&str; 4] = [
    "YOUTUBE_CHANNEL_URL",
    "TWITCH_BOT_USER_ID",
    "TWITCH_CLIENT_ID",
    "TWITCH_CHANNEL_USER_ID",
];

/// Default outbound message template.
pub const DEFAULT_MESSAGE_FORMAT: &str = "[YT] {author}: {message}";

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Source channel, e.g. `https://www.youtube.com/@SomeChannel`.
    pub youtube_channel_url: String,
    /// Twitch user id the bot sends as.
    pub twitch_bot_user_id: String,
    /// OAuth application client id.
    pub twitch_client_id: String,
    /// Twitch user id of the destination channel.
    pub twitch_channel_user_id: String,
    /// Bot access token; may be empty when bootstrapping from the shared store.
    pub twitch_oauth_token: String,
    /// OAuth application secret, needed for refresh-token exchange.
    pub twitch_client_secret: Option<String>,
    /// Bot refresh token.
    pub twitch_bot_refresh_token: Option<String>,
    /// Outbound template with `{author}` / `{message}` placeholders.
    pub message_format: String,
    /// Skip liveness gating and relay unconditionally.
    pub debug_mode: bool,
    /// Restart the pipeline after a fatal error.
    pub auto_restart: bool,
    /// Delay before such a restart.
    pub restart_delay: Duration,
    /// Interval between blocked-term refresh checks.
    pub blocked_terms_refresh: Duration,
    /// Interval between liveness checks.
    pub liveness_check_interval: Duration,
    /// Disable liveness gating without enabling other debug behavior.
    pub skip_liveness_check: bool,
    /// Interval between emoji-map reloads.
    pub emoji_reload_interval: Duration,
    /// Lowercase messages typed in all caps.
    pub normalize_caps: bool,
    /// Collapse repeated emoji shortcodes.
    pub collapse_emojis: bool,
    /// Directory holding the shared state files.
    pub data_dir: PathBuf,
}

impl RelayConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|key| get(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Error::config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            youtube_channel_url: get("YOUTUBE_CHANNEL_URL").unwrap(),
            twitch_bot_user_id: get("TWITCH_BOT_USER_ID").unwrap(),
            twitch_client_id: get("TWITCH_CLIENT_ID").unwrap(),
            twitch_channel_user_id: get("TWITCH_CHANNEL_USER_ID").unwrap(),
            twitch_oauth_token: get("TWITCH_OAUTH_TOKEN").unwrap_or_default(),
            twitch_client_secret: get("TWITCH_CLIENT_SECRET"),
            twitch_bot_refresh_token: get("TWITCH_BOT_REFRESH_TOKEN"),
            message_format: get("MESSAGE_FORMAT")
                .unwrap_or_else(|| DEFAULT_MESSAGE_FORMAT.to_string()),
            debug_mode: parse_bool(get("DEBUG_MODE"), false),
            auto_restart: parse_bool(get("AUTO_RESTART"), true),
            restart_delay: Duration::from_secs(parse_u64(get("RESTART_DELAY"), 30)),
            blocked_terms_refresh: Duration::from_secs(
                parse_u64(get("BLOCKED_TERMS_REFRESH_MINUTES"), 30) * 60,
            ),
            liveness_check_interval: Duration::from_secs(parse_u64(
                get("LIVENESS_CHECK_SECONDS"),
                10,
            )),
            skip_liveness_check: parse_bool(get("SKIP_LIVENESS_CHECK"), false),
            emoji_reload_interval: Duration::from_secs(parse_u64(
                get("EMOJI_RELOAD_SECONDS"),
                300,
            )),
            normalize_caps: parse_bool(get("NORMALIZE_CAPS"), true),
            collapse_emojis: parse_bool(get("COLLAPSE_EMOJIS"), true),
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| "data".to_string())),
        })
    }

    /// Liveness gating is off in debug mode or when explicitly skipped.
    pub fn liveness_gating_enabled(&self) -> bool {
        !self.debug_mode && !self.skip_liveness_check
    }
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) => matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"),
        None => default,
    }
}

fn parse_u64(value: Option<String>, default: u64) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("YOUTUBE_CHANNEL_URL", "https://www.youtube.com/@TestChannel"),
            ("TWITCH_BOT_USER_ID", "123456"),
            ("TWITCH_CLIENT_ID", "test_client_id"),
            ("TWITCH_CHANNEL_USER_ID", "789012"),
        ])
    }

    fn load(vars: HashMap<&str, &str>) -> Result<RelayConfig> {
        RelayConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_load_returns_required_fields() {
        let config = load(base_vars()).unwrap();

        assert_eq!(
            config.youtube_channel_url,
            "https://www.youtube.com/@TestChannel"
        );
        assert_eq!(config.twitch_bot_user_id, "123456");
        assert_eq!(config.twitch_client_id, "test_client_id");
        assert_eq!(config.twitch_channel_user_id, "789012");
    }

    #[test]
    fn test_load_defaults() {
        let config = load(base_vars()).unwrap();

        assert_eq!(config.message_format, DEFAULT_MESSAGE_FORMAT);
        assert!(!config.debug_mode);
        assert!(config.auto_restart);
        assert_eq!(config.restart_delay, Duration::from_secs(30));
        assert_eq!(config.blocked_terms_refresh, Duration::from_secs(30 * 60));
        assert_eq!(config.liveness_check_interval, Duration::from_secs(10));
        assert_eq!(config.emoji_reload_interval, Duration::from_secs(300));
        assert!(config.normalize_caps);
        assert!(config.collapse_emojis);
    }

    #[test]
    fn test_load_missing_required_fails() {
        let mut vars = base_vars();
        vars.remove("YOUTUBE_CHANNEL_URL");

        let err = load(vars).unwrap_err();

        match err {
            Error::Configuration(msg) => assert!(msg.contains("YOUTUBE_CHANNEL_URL")),
            other => panic!("expected Configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_without_auth_still_works() {
        // Auth is optional: the relay bootstraps from the shared token file.
        let config = load(base_vars()).unwrap();

        assert!(config.twitch_oauth_token.is_empty());
        assert!(config.twitch_client_secret.is_none());
        assert!(config.twitch_bot_refresh_token.is_none());
    }

    #[test]
    fn test_load_bool_parsing() {
        let mut vars = base_vars();
        vars.insert("DEBUG_MODE", "true");
        vars.insert("AUTO_RESTART", "no");
        vars.insert("COLLAPSE_EMOJIS", "1");

        let config = load(vars).unwrap();

        assert!(config.debug_mode);
        assert!(!config.auto_restart);
        assert!(config.collapse_emojis);
    }

    #[test]
    fn test_liveness_gating_flags() {
        let config = load(base_vars()).unwrap();
        assert!(config.liveness_gating_enabled());

        let mut vars = base_vars();
        vars.insert("DEBUG_MODE", "true");
        assert!(!load(vars).unwrap().liveness_gating_enabled());

        let mut vars = base_vars();
        vars.insert("SKIP_LIVENESS_CHECK", "yes");
        assert!(!load(vars).unwrap().liveness_gating_enabled());
    }
}
