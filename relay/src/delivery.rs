//! Delivery to the destination channel.
//!
//! Wraps the Helix client with the credential lifecycle and the
//! moderation filter. Credential refresh tries an ordered list of
//! strategies: a peer process may already have refreshed the shared
//! token file, in which case spending our own refresh token would
//! invalidate the pair the peer just obtained.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use twitch_api::{Credential, HelixClient, SendStatus, SharedTokenStore};

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::moderation::ModerationFilter;

/// Ordered credential refresh strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshStrategy {
    /// Adopt a newer credential from the shared token file.
    SharedStore,
    /// Exchange our refresh token for a new pair.
    RefreshExchange,
}

const REFRESH_ORDER: [RefreshStrategy; 2] =
    [RefreshStrategy::SharedStore, RefreshStrategy::RefreshExchange];

/// Seam for the pipeline's outbound side, so tests can inject a fake.
#[async_trait]
pub trait MessageSink: Send {
    /// Deliver one message. Returns whether the send succeeded.
    async fn send(&mut self, message: &str) -> bool;
}

/// Authenticated, send-only Twitch delivery client.
pub struct TwitchDelivery {
    helix: HelixClient,
    credential: Credential,
    bot_user_id: String,
    channel_user_id: String,
    token_store: SharedTokenStore,
    pub(crate) moderation: ModerationFilter,
    blocked_terms_refresh: Duration,
}

impl TwitchDelivery {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            helix: HelixClient::new(
                config.twitch_client_id.clone(),
                config.twitch_client_secret.clone(),
            ),
            credential: Credential::new(
                config.twitch_oauth_token.clone(),
                config.twitch_bot_refresh_token.clone(),
            ),
            bot_user_id: config.twitch_bot_user_id.clone(),
            channel_user_id: config.twitch_channel_user_id.clone(),
            token_store: SharedTokenStore::new(config.data_dir.join("tokens.json")),
            moderation: ModerationFilter::new(&config.data_dir),
            blocked_terms_refresh: config.blocked_terms_refresh,
        }
    }

    /// Establish a working credential and load the moderation list.
    pub async fn connect(&mut self) -> Result<()> {
        // A locally configured token may be absent entirely when the relay
        // bootstraps from the shared store.
        if self.credential.access_token.is_empty() && !self.refresh_credentials().await {
            return Err(Error::auth("no access token available"));
        }

        let mut valid = self.helix.validate_token(&self.credential.access_token).await?;
        if !valid {
            info!("access token expired, attempting refresh");
            if self.refresh_credentials().await {
                valid = self.helix.validate_token(&self.credential.access_token).await?;
            }
        }
        if !valid {
            return Err(Error::auth("could not establish a valid access token"));
        }

        self.moderation.load();
        info!("twitch delivery client ready");
        Ok(())
    }

    /// Try each refresh strategy in order until one yields a credential.
    async fn refresh_credentials(&mut self) -> bool {
        for strategy in REFRESH_ORDER {
            match self.try_strategy(strategy).await {
                Some(credential) => {
                    if strategy == RefreshStrategy::RefreshExchange
                        && let Err(e) = self.token_store.save(&credential)
                    {
                        warn!(error = %e, "failed to persist refreshed tokens");
                    }
                    debug!(?strategy, "credential refreshed");
                    self.credential = credential;
                    return true;
                }
                None => continue,
            }
        }
        false
    }

    async fn try_strategy(&mut self, strategy: RefreshStrategy) -> Option<Credential> {
        match strategy {
            RefreshStrategy::SharedStore => self
                .token_store
                .load()
                .filter(|stored| stored.access_token != self.credential.access_token),
            RefreshStrategy::RefreshExchange => {
                let refresh_token = self.credential.refresh_token.clone()?;
                match self.helix.refresh_token(&refresh_token).await {
                    Ok(credential) => Some(credential),
                    Err(e) => {
                        warn!(error = %e, "refresh token exchange failed");
                        None
                    }
                }
            }
        }
    }

    /// Send one message, refreshing and retrying once on auth failure.
    pub async fn send_message(&mut self, message: &str) -> bool {
        match self.attempt_send(message).await {
            Ok(SendStatus::Sent) => true,
            Ok(SendStatus::Unauthorized) => {
                info!("send unauthorized, refreshing token and retrying");
                if !self.refresh_credentials().await {
                    warn!("no refresh strategy produced a credential, dropping message");
                    return false;
                }
                match self.attempt_send(message).await {
                    Ok(SendStatus::Sent) => true,
                    Ok(status) => {
                        warn!(?status, "retry after refresh failed, dropping message");
                        false
                    }
                    Err(e) => {
                        warn!(error = %e, "retry after refresh failed, dropping message");
                        false
                    }
                }
            }
            Ok(SendStatus::Rejected(status)) => {
                warn!(status = %status, "send rejected, dropping message");
                false
            }
            Err(e) => {
                warn!(error = %e, "send failed, dropping message");
                false
            }
        }
    }

    async fn attempt_send(&self, message: &str) -> twitch_api::Result<SendStatus> {
        self.helix
            .send_chat_message(
                &self.credential.access_token,
                &self.channel_user_id,
                &self.bot_user_id,
                message,
            )
            .await
    }

    /// Whether the destination channel is live.
    ///
    /// Fails open: a transient probe failure must never stall the relay,
    /// so only an explicit successful "offline" answer returns false.
    pub async fn is_live(&self) -> bool {
        match self
            .helix
            .stream_is_live(&self.credential.access_token, &self.channel_user_id)
            .await
        {
            Ok(live) => live,
            Err(e) => {
                warn!(error = %e, "could not check channel live status, assuming live");
                true
            }
        }
    }

    /// Check a rendered message against the moderation list.
    pub fn is_message_blocked(&self, message: &str) -> Option<&str> {
        self.moderation.is_blocked(message)
    }

    /// Interval- and mtime-gated moderation reload.
    pub fn refresh_blocked_terms_if_needed(&mut self) {
        self.moderation.refresh_if_needed(self.blocked_terms_refresh);
    }
}

#[async_trait]
impl MessageSink for TwitchDelivery {
    async fn send(&mut self, message: &str) -> bool {
        self.send_message(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(data_dir: PathBuf) -> RelayConfig {
        let mut config = RelayConfig::from_lookup(|key| {
            match key {
                "YOUTUBE_CHANNEL_URL" => Some("https://www.youtube.com/@Test"),
                "TWITCH_BOT_USER_ID" => Some("123"),
                "TWITCH_CLIENT_ID" => Some("client"),
                "TWITCH_CHANNEL_USER_ID" => Some("456"),
                "TWITCH_OAUTH_TOKEN" => Some("current_token"),
                _ => None,
            }
            .map(String::from)
        })
        .unwrap();
        config.data_dir = data_dir;
        config
    }

    #[tokio::test]
    async fn test_shared_store_strategy_adopts_newer_credential() {
        let dir = tempfile::tempdir().unwrap();
        let mut delivery = TwitchDelivery::new(&config(dir.path().to_path_buf()));

        let refreshed = Credential::new("peer_token", Some("peer_refresh".to_string()));
        delivery.token_store.save(&refreshed).unwrap();

        assert!(delivery.refresh_credentials().await);
        assert_eq!(delivery.credential, refreshed);
    }

    #[tokio::test]
    async fn test_shared_store_strategy_skips_same_credential() {
        let dir = tempfile::tempdir().unwrap();
        let mut delivery = TwitchDelivery::new(&config(dir.path().to_path_buf()));

        // The stored credential matches what we already hold, so the
        // shared-store strategy reports "no change"; with no refresh token
        // configured the exchange strategy cannot run either.
        let same = Credential::new("current_token", None);
        delivery.token_store.save(&same).unwrap();

        assert!(!delivery.refresh_credentials().await);
        assert_eq!(delivery.credential.access_token, "current_token");
    }

    #[tokio::test]
    async fn test_refresh_without_any_strategy_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut delivery = TwitchDelivery::new(&config(dir.path().to_path_buf()));

        assert!(!delivery.refresh_credentials().await);
    }

    #[test]
    fn test_moderation_delegation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("blacklist.json"),
            r#"["badword"]"#,
        )
        .unwrap();
        let mut delivery = TwitchDelivery::new(&config(dir.path().to_path_buf()));
        delivery.moderation.load();

        assert_eq!(
            delivery.is_message_blocked("such a BadWord here"),
            Some("badword")
        );
        assert_eq!(delivery.is_message_blocked("fine"), None);
    }
}
