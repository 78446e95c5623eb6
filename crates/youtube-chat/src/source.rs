//! Background polling state machine.
//!
//! `ChatSource` owns a background task that cycles through
//! Locating -> Handshaking -> Polling, pushing parsed events onto a
//! bounded channel. Every failure path (network, protocol, not-live,
//! normal session end) falls into the same backoff-and-relocate sleep,
//! with the delay doubling per consecutive failure and resetting after
//! any successful poll.

use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::innertube::InnerTubeClient;
use crate::message::ChatEvent;

/// Tunables for the polling loop.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Channel URL, e.g. `https://www.youtube.com/@SomeChannel`.
    pub channel_url: String,
    /// First retry delay after a failure.
    pub backoff_floor: Duration,
    /// Upper bound on the retry delay.
    pub backoff_cap: Duration,
    /// Lower bound applied to the server-suggested poll interval.
    pub min_poll_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Capacity of the event channel.
    pub queue_capacity: usize,
}

impl SourceConfig {
    pub fn new(channel_url: impl Into<String>) -> Self {
        Self {
            channel_url: channel_url.into(),
            backoff_floor: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(300),
            min_poll_interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
            queue_capacity: 256,
        }
    }
}

/// How one locate/handshake/poll session ended.
enum SessionEnd {
    /// Server stopped issuing continuation tokens.
    StreamEnded,
    /// Cooperative stop was requested.
    Cancelled,
}

/// Background live-chat reader for one channel.
pub struct ChatSource {
    config: SourceConfig,
    client: Client,
    tx: mpsc::Sender<ChatEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChatSource {
    /// Create a source and the receiving end of its event channel.
    pub fn new(config: SourceConfig) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        (
            Self {
                config,
                client,
                tx,
                cancel: CancellationToken::new(),
                task: None,
            },
            rx,
        )
    }

    /// Whether the background task is currently running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Spawn the background polling task. No-op if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        info!(channel = %self.config.channel_url, "starting chat source");
        let cancel = CancellationToken::new();
        self.cancel = cancel.clone();
        let config = self.config.clone();
        let client = self.client.clone();
        let tx = self.tx.clone();

        self.task = Some(tokio::spawn(async move {
            run_loop(client, config, tx, cancel).await;
        }));
    }

    /// Request a cooperative stop.
    ///
    /// The task exits at its next loop boundary; an in-flight request is
    /// bounded by the configured request timeout.
    pub fn stop(&mut self) {
        if self.task.is_some() {
            info!(channel = %self.config.channel_url, "stopping chat source");
        }
        self.cancel.cancel();
        self.task = None;
    }
}

impl Drop for ChatSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Next retry delay: double, bounded by the cap.
fn next_backoff(current: Duration, cap: Duration) -> Duration {
    (current * 2).min(cap)
}

async fn run_loop(
    client: Client,
    config: SourceConfig,
    tx: mpsc::Sender<ChatEvent>,
    cancel: CancellationToken,
) {
    let inner = InnerTubeClient::new(client, config.channel_url.clone());
    let mut backoff = config.backoff_floor;

    while !cancel.is_cancelled() {
        match run_session(&inner, &config, &tx, &cancel, &mut backoff).await {
            Ok(SessionEnd::Cancelled) => break,
            Ok(SessionEnd::StreamEnded) => {
                info!("live chat session ended, reconnecting");
            }
            Err(e) => {
                warn!(error = %e, "chat source error");
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        debug!(delay = ?backoff, "retrying chat session");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = next_backoff(backoff, config.backoff_cap);
    }

    debug!("chat source loop exited");
}

/// One full locate/handshake/poll session.
async fn run_session(
    inner: &InnerTubeClient,
    config: &SourceConfig,
    tx: &mpsc::Sender<ChatEvent>,
    cancel: &CancellationToken,
    backoff: &mut Duration,
) -> Result<SessionEnd> {
    // Locating
    if cancel.is_cancelled() {
        return Ok(SessionEnd::Cancelled);
    }
    let video_id = inner.find_live_video_id().await?;
    info!(video_id = %video_id, "located active broadcast");

    // Handshaking
    if cancel.is_cancelled() {
        return Ok(SessionEnd::Cancelled);
    }
    let session = inner.open_chat_session(&video_id).await?;
    debug!("live chat handshake complete");

    // Polling
    let mut continuation = session.continuation.clone();
    loop {
        if cancel.is_cancelled() {
            return Ok(SessionEnd::Cancelled);
        }

        let batch = inner.poll(&session.api_key, &continuation).await?;
        // A completed poll cycle resets the failure backoff.
        *backoff = config.backoff_floor;

        for event in batch.events {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                sent = tx.send(event) => {
                    if sent.is_err() {
                        // Receiver dropped: nobody is consuming anymore.
                        return Ok(SessionEnd::Cancelled);
                    }
                }
            }
        }

        let Some(next) = batch.continuation else {
            return Ok(SessionEnd::StreamEnded);
        };
        continuation = next.token;

        let wait = Duration::from_millis(next.timeout_ms).max(config.min_poll_interval);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let floor = Duration::from_secs(5);
        let cap = Duration::from_secs(300);

        let mut delay = floor;
        let mut observed = Vec::new();
        for _ in 0..3 {
            observed.push(delay);
            delay = next_backoff(delay, cap);
        }

        assert_eq!(
            observed,
            vec![floor, Duration::from_secs(10), Duration::from_secs(20)]
        );
    }

    #[test]
    fn test_backoff_saturates_at_cap() {
        let cap = Duration::from_secs(300);
        let delay = next_backoff(Duration::from_secs(200), cap);
        assert_eq!(delay, cap);
        assert_eq!(next_backoff(cap, cap), cap);
    }

    #[test]
    fn test_source_config_defaults() {
        let config = SourceConfig::new("https://www.youtube.com/@TestChannel");

        assert_eq!(config.backoff_floor, Duration::from_secs(5));
        assert_eq!(config.backoff_cap, Duration::from_secs(300));
        assert!(config.queue_capacity > 0);
    }

    #[tokio::test]
    async fn test_stop_cancels_without_start() {
        let (mut source, _rx) = ChatSource::new(SourceConfig::new("https://example.com/@c"));

        assert!(!source.is_running());
        source.stop();
        assert!(!source.is_running());
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let (mut source, _rx) = ChatSource::new(SourceConfig::new("http://127.0.0.1:1/@nowhere"));

        source.start();
        assert!(source.is_running());

        source.stop();
        assert!(!source.is_running());
    }
}
