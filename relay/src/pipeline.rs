//! Relay coordinator.
//!
//! Single consumer loop: dequeue one event, run it through the transform
//! and filter chain, and hand survivors to the delivery client, pacing
//! outbound sends. Housekeeping (spam-state cleanup, moderation refresh,
//! liveness checks) runs on the same loop between events, so every piece
//! of mutable filter state stays confined to this task.

use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use youtube_chat::{ChatEvent, ChatSource, SourceConfig};

use crate::config::RelayConfig;
use crate::delivery::{MessageSink, TwitchDelivery};
use crate::error::Result;
use crate::spam::{SpamGuard, SpamGuardConfig};
use crate::status::StreamStatusFile;
use crate::transform::{
    EmojiTransformer, MAX_UNIQUE_EMOJIS, capitalize_first, collapse_emojis, normalize_caps,
    render_template, truncate,
};

/// Destination hard limit on message length.
const MAX_MESSAGE_LEN: usize = 500;

/// Dequeue timeout; housekeeping runs at least this often.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause between outbound sends.
const SEND_PACING: Duration = Duration::from_millis(500);

/// Interval between spam-state cleanups.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Poll interval while waiting for the stream to go live.
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Heartbeat log interval while offline or waiting.
const OFFLINE_HEARTBEAT: Duration = Duration::from_secs(600);

/// Outcome of the filter chain for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Rendered message ready to send.
    Deliver(String),
    /// Identical to the author's previous message within the window.
    Duplicate { text: String },
    /// Author exhausted their send budget.
    RateLimited { text: String },
    /// Matched the moderation list.
    Blocked { message: String, fragment: String },
}

/// Coordinates the chat source, filter chain, and delivery client.
pub struct RelayPipeline {
    config: RelayConfig,
    source: ChatSource,
    events: mpsc::Receiver<ChatEvent>,
    delivery: TwitchDelivery,
    spam: SpamGuard,
    emoji: EmojiTransformer,
    status: StreamStatusFile,
    cancel: CancellationToken,
}

impl RelayPipeline {
    pub fn new(config: RelayConfig) -> Self {
        let (source, events) =
            ChatSource::new(SourceConfig::new(config.youtube_channel_url.clone()));
        let delivery = TwitchDelivery::new(&config);
        let mut emoji = EmojiTransformer::new(&config.data_dir, config.emoji_reload_interval);
        emoji.reload();
        let status = StreamStatusFile::new(&config.data_dir);

        Self {
            source,
            events,
            delivery,
            spam: SpamGuard::new(SpamGuardConfig::default()),
            emoji,
            status,
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Token that stops the pipeline when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            youtube = %self.config.youtube_channel_url,
            format = %self.config.message_format,
            "starting chat relay"
        );

        if self.config.liveness_gating_enabled()
            && !self.status.is_live()
            && !self.wait_for_stream_start().await
        {
            return Ok(());
        }

        self.delivery.connect().await?;
        self.source.start();
        info!("relay is running");

        let mut was_live = true;
        let mut offline_since: Option<Instant> = None;
        let mut last_live_check = Instant::now();
        let mut last_cleanup = Instant::now();
        let mut last_offline_log = Instant::now();

        while !self.cancel.is_cancelled() {
            // Liveness gating
            if self.config.liveness_gating_enabled()
                && last_live_check.elapsed() >= self.config.liveness_check_interval
            {
                last_live_check = Instant::now();
                let is_live = self.status.is_live();

                if was_live && !is_live {
                    info!("stream went offline, pausing relay");
                    was_live = false;
                    offline_since = Some(Instant::now());
                    last_offline_log = Instant::now();
                    // Stop the reader to avoid pointless polling while offline.
                    self.source.stop();
                } else if !was_live && is_live {
                    let offline_secs = offline_since.map(|t| t.elapsed().as_secs()).unwrap_or(0);
                    info!(offline_secs, "stream back online, resuming relay");
                    was_live = true;
                    offline_since = None;
                    self.source.start();
                } else if !was_live && last_offline_log.elapsed() >= OFFLINE_HEARTBEAT {
                    last_offline_log = Instant::now();
                    let minutes = offline_since.map(|t| t.elapsed().as_secs() / 60).unwrap_or(0);
                    info!(minutes, "still offline, waiting");
                }
            }

            self.delivery.refresh_blocked_terms_if_needed();

            if last_cleanup.elapsed() >= CLEANUP_INTERVAL {
                last_cleanup = Instant::now();
                self.spam.cleanup();
            }

            // While offline, leave queued events in the channel.
            if !was_live {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                continue;
            }

            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = tokio::time::timeout(DEQUEUE_TIMEOUT, self.events.recv()) => {
                    match received {
                        Ok(Some(event)) => event,
                        Ok(None) => {
                            warn!("event channel closed");
                            break;
                        }
                        // Timeout: loop around for housekeeping.
                        Err(_) => continue,
                    }
                }
            };

            let disposition = self.evaluate_event(&event);
            let delivered = dispatch(&mut self.delivery, &event.author, disposition).await;

            if delivered {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(SEND_PACING) => {}
                }
            }
        }

        self.source.stop();
        info!("relay stopped");
        Ok(())
    }

    /// Run one event through the transform and filter chain.
    pub fn evaluate_event(&mut self, event: &ChatEvent) -> Disposition {
        let text = capitalize_first(&event.text);

        self.emoji.reload_if_needed();
        let mut text = self.emoji.convert(&text);
        if self.config.normalize_caps {
            text = normalize_caps(&text);
        }
        if self.config.collapse_emojis {
            text = collapse_emojis(&text, MAX_UNIQUE_EMOJIS);
        }

        if self.spam.is_duplicate(&event.author, &text) {
            return Disposition::Duplicate { text };
        }
        if self.spam.is_rate_limited(&event.author) {
            return Disposition::RateLimited { text };
        }

        let rendered = render_template(&self.config.message_format, &event.author, &text);
        let message = truncate(&rendered, MAX_MESSAGE_LEN);

        if let Some(fragment) = self.delivery.is_message_blocked(&message) {
            let fragment = fragment.to_string();
            return Disposition::Blocked { message, fragment };
        }

        Disposition::Deliver(message)
    }

    /// Block until the status file reports live, or cancellation.
    async fn wait_for_stream_start(&self) -> bool {
        info!("waiting for stream to go live");
        let started = Instant::now();
        let mut last_heartbeat = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                info!("cancelled while waiting for stream");
                return false;
            }
            if self.status.is_live() {
                info!(waited_secs = started.elapsed().as_secs(), "stream is now live");
                return true;
            }
            if last_heartbeat.elapsed() >= OFFLINE_HEARTBEAT {
                last_heartbeat = Instant::now();
                let minutes = started.elapsed().as_secs() / 60;
                info!(minutes, "still waiting for stream to go live");
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
            }
        }
    }
}

/// Act on a disposition: send deliverables, log drops.
///
/// Returns whether a message was actually sent (drives pacing).
async fn dispatch(sink: &mut impl MessageSink, author: &str, disposition: Disposition) -> bool {
    match disposition {
        Disposition::Deliver(message) => {
            info!(message = %message, "relaying message");
            sink.send(&message).await
        }
        Disposition::Duplicate { text } => {
            info!(author = %author, text = %text, "dropping duplicate message");
            false
        }
        Disposition::RateLimited { text } => {
            info!(author = %author, text = %text, "dropping rate-limited message");
            false
        }
        Disposition::Blocked { message, fragment } => {
            info!(author = %author, fragment = %fragment, message = %message, "dropping blocked message");
            false
        }
    }
}
