//! InnerTube live-chat protocol client.
//!
//! YouTube exposes live chat through an unauthenticated polling endpoint:
//! the watch page for an active broadcast yields a video id, the popout
//! chat page yields an API key plus an initial continuation token, and
//! `get_live_chat` then returns batches of chat items together with the
//! next continuation token and a server-suggested wait interval.

use regex::Regex;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::message::ChatEvent;

const LIVE_CHAT_POPOUT_URL: &str = "https://www.youtube.com/live_chat";
const GET_LIVE_CHAT_URL: &str = "https://www.youtube.com/youtubei/v1/live_chat/get_live_chat";

/// Client identification sent in the InnerTube request context.
const CLIENT_NAME: &str = "WEB";
const CLIENT_VERSION: &str = "2.20240101.00.00";

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Poll interval used when the server response carries no suggestion.
const DEFAULT_TIMEOUT_MS: u64 = 1000;

static VIDEO_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""videoId"\s*:\s*"([A-Za-z0-9_-]{11})""#).unwrap());
static API_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#).unwrap());
static CONTINUATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""continuation"\s*:\s*"([^"]+)""#).unwrap());

/// Handshake result: everything needed to start polling.
#[derive(Debug, Clone)]
pub struct ChatSession {
    /// InnerTube API key scraped from the chat page.
    pub api_key: String,
    /// Initial continuation token.
    pub continuation: String,
}

/// Next-poll instruction extracted from a poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollContinuation {
    /// Opaque token to present on the next poll.
    pub token: String,
    /// Server-suggested wait before the next poll.
    pub timeout_ms: u64,
}

/// One batch of parsed chat items plus the next continuation, if any.
///
/// `continuation == None` means the session has ended.
#[derive(Debug, Clone)]
pub struct PollBatch {
    pub events: Vec<ChatEvent>,
    pub continuation: Option<PollContinuation>,
}

/// HTTP client for the InnerTube live-chat surface.
pub struct InnerTubeClient {
    client: Client,
    channel_url: String,
}

impl InnerTubeClient {
    pub fn new(client: Client, channel_url: impl Into<String>) -> Self {
        let mut channel_url = channel_url.into();
        while channel_url.ends_with('/') {
            channel_url.pop();
        }
        Self {
            client,
            channel_url,
        }
    }

    /// Resolve the currently active broadcast for the channel.
    pub async fn find_live_video_id(&self) -> Result<String> {
        let url = format!("{}/live", self.channel_url);
        let html = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, DEFAULT_UA)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        extract_video_id(&html).ok_or(Error::NotLive)
    }

    /// Fetch the popout chat page once to obtain the API key and the
    /// initial continuation token.
    pub async fn open_chat_session(&self, video_id: &str) -> Result<ChatSession> {
        let html = self
            .client
            .get(LIVE_CHAT_POPOUT_URL)
            .header(reqwest::header::USER_AGENT, DEFAULT_UA)
            .query(&[("is_popout", "1"), ("v", video_id)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let api_key = extract_api_key(&html)
            .ok_or_else(|| Error::protocol("no INNERTUBE_API_KEY in chat page"))?;
        let continuation = extract_continuation(&html)
            .ok_or_else(|| Error::protocol("no continuation token in chat page"))?;

        Ok(ChatSession {
            api_key,
            continuation,
        })
    }

    /// Fetch the next batch of chat items for a continuation token.
    pub async fn poll(&self, api_key: &str, continuation: &str) -> Result<PollBatch> {
        let body = poll_request_body(continuation);
        let response: Value = self
            .client
            .post(GET_LIVE_CHAT_URL)
            .header(reqwest::header::USER_AGENT, DEFAULT_UA)
            .query(&[("key", api_key), ("prettyPrint", "false")])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_poll_response(&response)
    }
}

/// Build the `get_live_chat` request payload.
pub fn poll_request_body(continuation: &str) -> Value {
    json!({
        "context": {
            "client": {
                "clientName": CLIENT_NAME,
                "clientVersion": CLIENT_VERSION,
            }
        },
        "continuation": continuation,
    })
}

/// Scrape a video id from a channel `/live` page.
pub fn extract_video_id(html: &str) -> Option<String> {
    VIDEO_ID_REGEX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Scrape the InnerTube API key from a chat page.
pub fn extract_api_key(html: &str) -> Option<String> {
    API_KEY_REGEX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Scrape the initial continuation token from a chat page.
pub fn extract_continuation(html: &str) -> Option<String> {
    CONTINUATION_REGEX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse a `get_live_chat` response into events and the next continuation.
pub fn parse_poll_response(response: &Value) -> Result<PollBatch> {
    let chat = response
        .get("continuationContents")
        .and_then(|c| c.get("liveChatContinuation"))
        .ok_or_else(|| Error::protocol("no liveChatContinuation in poll response"))?;

    let mut events = Vec::new();
    if let Some(actions) = chat.get("actions").and_then(|a| a.as_array()) {
        for action in actions {
            let item = action
                .get("addChatItemAction")
                .and_then(|a| a.get("item"));
            if let Some(item) = item
                && let Some(event) = parse_chat_item(item)
            {
                events.push(event);
            }
        }
    }

    let continuation = chat
        .get("continuations")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.iter().find_map(parse_continuation));

    debug!(
        events = events.len(),
        has_continuation = continuation.is_some(),
        "parsed poll batch"
    );

    Ok(PollBatch {
        events,
        continuation,
    })
}

/// Parse one chat item into an event.
///
/// Only `liveChatTextMessageRenderer` items produce events; membership,
/// sticker, and other renderers are skipped. An item whose message runs
/// render to an empty string is dropped.
pub fn parse_chat_item(item: &Value) -> Option<ChatEvent> {
    let renderer = item.get("liveChatTextMessageRenderer")?;

    let author = renderer
        .get("authorName")
        .and_then(|a| a.get("simpleText"))
        .and_then(|s| s.as_str())
        .unwrap_or("Unknown");

    let runs = renderer
        .get("message")
        .and_then(|m| m.get("runs"))
        .and_then(|r| r.as_array())?;

    let mut text = String::new();
    for run in runs {
        if let Some(fragment) = run.get("text").and_then(|t| t.as_str()) {
            text.push_str(fragment);
        } else if let Some(shortcut) = run
            .get("emoji")
            .and_then(|e| e.get("shortcuts"))
            .and_then(|s| s.as_array())
            .and_then(|arr| arr.first())
            .and_then(|s| s.as_str())
        {
            text.push_str(shortcut);
        }
    }

    if text.is_empty() {
        return None;
    }

    Some(ChatEvent::new(author, text))
}

/// Extract `{continuation, timeoutMs}` from one continuations entry.
///
/// Timed and invalidation continuations both carry a token; reload
/// continuations carry a token but no suggested interval.
fn parse_continuation(entry: &Value) -> Option<PollContinuation> {
    for key in [
        "timedContinuationData",
        "invalidationContinuationData",
        "reloadContinuationData",
    ] {
        if let Some(data) = entry.get(key) {
            let token = data.get("continuation").and_then(|c| c.as_str())?;
            let timeout_ms = data
                .get("timeoutMs")
                .and_then(|t| t.as_u64())
                .unwrap_or(DEFAULT_TIMEOUT_MS);
            return Some(PollContinuation {
                token: token.to_string(),
                timeout_ms,
            });
        }
    }
    None
}
