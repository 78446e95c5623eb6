//! Helix / OAuth2 HTTP client.
//!
//! Send-only: this client posts chat messages and queries stream status,
//! it does not read Twitch chat.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use crate::credentials::Credential;
use crate::error::{Error, Result};

const VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";
const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const SEND_MESSAGE_URL: &str = "https://api.twitch.tv/helix/chat/messages";
const STREAMS_URL: &str = "https://api.twitch.tv/helix/streams";
const BLOCKED_TERMS_URL: &str = "https://api.twitch.tv/helix/moderation/blocked_terms";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Page size for the blocked-terms listing.
const BLOCKED_TERMS_PAGE_SIZE: u32 = 100;

/// Outcome of a single send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Accepted by the API.
    Sent,
    /// Token rejected; caller may refresh and retry.
    Unauthorized,
    /// Rejected for another reason; not retryable.
    Rejected(StatusCode),
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

/// Client for the Helix and OAuth2 endpoints.
pub struct HelixClient {
    client: Client,
    client_id: String,
    client_secret: Option<String>,
}

impl HelixClient {
    pub fn new(client_id: impl Into<String>, client_secret: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            client_id: client_id.into(),
            client_secret,
        }
    }

    /// Validate an access token.
    ///
    /// Returns `Ok(true)` for a valid token, `Ok(false)` for 401.
    pub async fn validate_token(&self, access_token: &str) -> Result<bool> {
        let response = self
            .client
            .get(VALIDATE_URL)
            .header("Authorization", format!("OAuth {}", access_token))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::UNAUTHORIZED => Ok(false),
            status => Err(Error::Status(status)),
        }
    }

    /// Exchange a refresh token for a new access/refresh pair.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Credential> {
        let Some(client_secret) = self.client_secret.as_deref() else {
            return Err(Error::auth("no client secret configured for refresh"));
        };

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", client_secret),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::auth(format!("token refresh failed: {}", status)));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| Error::parse(e.to_string()))?;

        debug!("oauth token refreshed");
        Ok(Credential::new(
            body.access_token,
            Some(body.refresh_token),
        ))
    }

    /// Post one chat message to a channel.
    pub async fn send_chat_message(
        &self,
        access_token: &str,
        broadcaster_id: &str,
        sender_id: &str,
        message: &str,
    ) -> Result<SendStatus> {
        let response = self
            .client
            .post(SEND_MESSAGE_URL)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Client-Id", &self.client_id)
            .json(&json!({
                "broadcaster_id": broadcaster_id,
                "sender_id": sender_id,
                "message": message,
            }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(SendStatus::Sent),
            StatusCode::UNAUTHORIZED => Ok(SendStatus::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "send rejected");
                Ok(SendStatus::Rejected(status))
            }
        }
    }

    /// Query whether a channel is currently live.
    pub async fn stream_is_live(&self, access_token: &str, user_id: &str) -> Result<bool> {
        let response = self
            .client
            .get(STREAMS_URL)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Client-Id", &self.client_id)
            .query(&[("user_id", user_id)])
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::parse(e.to_string()))?;

        let live = body
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|streams| streams.first())
            .and_then(|s| s.get("type"))
            .and_then(|t| t.as_str())
            .is_some_and(|t| t == "live");

        Ok(live)
    }

    /// Fetch the channel's blocked terms, following pagination cursors.
    ///
    /// Alternate source of moderation data for deployments that maintain
    /// the list on Twitch rather than on disk.
    pub async fn blocked_terms(
        &self,
        access_token: &str,
        broadcaster_id: &str,
        moderator_id: &str,
    ) -> Result<Vec<String>> {
        let mut terms = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(BLOCKED_TERMS_URL)
                .header("Authorization", format!("Bearer {}", access_token))
                .header("Client-Id", &self.client_id)
                .query(&[
                    ("broadcaster_id", broadcaster_id),
                    ("moderator_id", moderator_id),
                ])
                .query(&[("first", BLOCKED_TERMS_PAGE_SIZE)]);
            if let Some(after) = cursor.as_deref() {
                request = request.query(&[("after", after)]);
            }

            let body: Value = request
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
                .map_err(|e| Error::parse(e.to_string()))?;

            if let Some(data) = body.get("data").and_then(|d| d.as_array()) {
                for entry in data {
                    if let Some(text) = entry.get("text").and_then(|t| t.as_str()) {
                        terms.push(text.to_string());
                    }
                }
            }

            cursor = body
                .get("pagination")
                .and_then(|p| p.get("cursor"))
                .and_then(|c| c.as_str())
                .filter(|c| !c.is_empty())
                .map(String::from);

            if cursor.is_none() {
                break;
            }
        }

        debug!(count = terms.len(), "fetched blocked terms");
        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_status_equality() {
        assert_eq!(SendStatus::Sent, SendStatus::Sent);
        assert_ne!(SendStatus::Sent, SendStatus::Unauthorized);
        assert_eq!(
            SendStatus::Rejected(StatusCode::BAD_REQUEST),
            SendStatus::Rejected(StatusCode::BAD_REQUEST)
        );
    }

    #[test]
    fn test_refresh_response_parsing() {
        let body = r#"{"access_token": "new_access", "refresh_token": "new_refresh", "scope": ["chat:edit"], "token_type": "bearer"}"#;

        let parsed: RefreshResponse = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.access_token, "new_access");
        assert_eq!(parsed.refresh_token, "new_refresh");
    }

    #[tokio::test]
    async fn test_refresh_without_secret_is_auth_error() {
        let client = HelixClient::new("client_id", None);

        let result = client.refresh_token("some_refresh").await;

        assert!(matches!(result, Err(Error::Auth(_))));
    }
}
