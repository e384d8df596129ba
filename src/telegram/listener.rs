use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{LISTENER_BACKOFF_MS, STILL_HERE_MESSAGE, TIMES_UNAVAILABLE_MESSAGE};
use crate::detector::DeltaEngine;
use crate::dispatch::Dispatcher;
use crate::scoreboard::times::{format_times, parse_times};
use crate::scoreboard::ScoreboardSource;
use crate::state::StateStore;
use crate::telegram::{ChatTransport, InboundMessage};
use crate::types::Checkpoint;

/// Inbound side of the bot: onboards new chats and answers known ones.
/// Runs next to the poll loop and shares the dispatcher's subscriber set.
pub struct Listener {
    transport: Arc<dyn ChatTransport>,
    dispatcher: Arc<Dispatcher>,
    engine: Arc<DeltaEngine>,
    store: Arc<dyn StateStore>,
    /// HTML scoreboard behind /times.
    times_source: Arc<dyn ScoreboardSource>,
    shutdown: watch::Receiver<bool>,
}

impl Listener {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        dispatcher: Arc<Dispatcher>,
        engine: Arc<DeltaEngine>,
        store: Arc<dyn StateStore>,
        times_source: Arc<dyn ScoreboardSource>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { transport, dispatcher, engine, store, times_source, shutdown }
    }

    pub async fn run(mut self) {
        let mut offset = 0i64;
        let mut backoff_idx = 0usize;

        while !*self.shutdown.borrow() {
            let polled = tokio::select! {
                r = self.transport.poll_updates(offset) => r,
                _ = self.shutdown.changed() => break,
            };

            match polled {
                Ok(updates) => {
                    backoff_idx = 0;
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Some(msg) = update.message {
                            self.handle(msg).await;
                        }
                    }
                }
                Err(e) => {
                    let delay_ms = LISTENER_BACKOFF_MS
                        .get(backoff_idx)
                        .or(LISTENER_BACKOFF_MS.last())
                        .copied()
                        .unwrap_or(1000);
                    backoff_idx = (backoff_idx + 1).min(LISTENER_BACKOFF_MS.len().saturating_sub(1));
                    warn!("listener poll failed, retrying in {delay_ms}ms: {e}");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                        _ = self.shutdown.changed() => break,
                    }
                }
            }
        }
        info!("listener stopped");
    }

    async fn handle(&self, msg: InboundMessage) {
        let Some(text) = msg.text.as_deref().filter(|_| msg.content_type == "text") else {
            debug!(chat_id = msg.chat_id, kind = %msg.content_type, "ignoring non-text message");
            return;
        };
        let user = msg.sender_display_name.as_str();

        if !self.dispatcher.is_subscribed(msg.chat_id).await {
            if let Err(e) = self.dispatcher.add_subscriber(msg.chat_id, user, text).await {
                warn!(chat_id = msg.chat_id, "subscribing {user} failed: {e}");
            }
        } else {
            let reply = match text.trim() {
                "/status" => status_text(&self.engine.checkpoint().await),
                "/times" => self.times_text().await,
                _ => {
                    info!("{user} asked if I'm still here");
                    STILL_HERE_MESSAGE.to_string()
                }
            };
            if let Err(e) = self.dispatcher.reply(msg.chat_id, &reply).await {
                warn!(chat_id = msg.chat_id, "reply failed: {e}");
            }
        }

        if let Err(e) = self.store.log_message(msg.chat_id, user, text).await {
            warn!(chat_id = msg.chat_id, "message not archived: {e}");
        }
    }

    async fn times_text(&self) -> String {
        let times = self
            .times_source
            .fetch()
            .await
            .and_then(|html| parse_times(&html, chrono::Local::now().naive_local()));
        match times {
            Ok(teams) => format_times(&teams),
            Err(e) => {
                warn!("times lookup failed: {e}");
                TIMES_UNAVAILABLE_MESSAGE.to_string()
            }
        }
    }
}

pub fn status_text(cp: &Checkpoint) -> String {
    format!(
        "Last pwn seen: {}\nTracked rank: {}",
        cp.last_seen_timestamp.as_deref().unwrap_or("none yet"),
        cp.last_seen_rank.as_deref().unwrap_or("unknown"),
    )
}
