use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::WELCOME_MESSAGE;
use crate::dispatch::MaintainerChannel;
use crate::error::{AppError, Result};
use crate::state::StateStore;
use crate::telegram::{ChatTransport, SendError};
use crate::types::{DebugEvent, Subscriber};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<i64>,
    /// Subscribers dropped because they blocked the bot or vanished.
    pub removed: Vec<i64>,
}

/// Owns the in-memory subscriber set and fans messages out to it.
///
/// The set mirrors the StateStore list. Every mutation goes through the one
/// mutex, so an add from the listener cannot be lost to a removal issued by a
/// broadcast that is running at the same time.
pub struct Dispatcher {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn StateStore>,
    maintainer: Arc<MaintainerChannel>,
    subscribers: Mutex<Vec<Subscriber>>,
    send_delay: Duration,
}

impl Dispatcher {
    /// Loads the persisted subscriber list.
    pub async fn load(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn StateStore>,
        maintainer: Arc<MaintainerChannel>,
        send_delay: Duration,
    ) -> Result<Self> {
        let subscribers = store.list_subscribers().await?;
        info!(count = subscribers.len(), "subscribers loaded");
        Ok(Self {
            transport,
            store,
            maintainer,
            subscribers: Mutex::new(subscribers),
            send_delay,
        })
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn is_subscribed(&self, chat_id: i64) -> bool {
        self.subscribers.lock().await.iter().any(|s| s.chat_id == chat_id)
    }

    pub async fn subscribers(&self) -> Vec<Subscriber> {
        self.subscribers.lock().await.clone()
    }

    /// Registers a new chat: memory first, then the store, then the welcome.
    ///
    /// Returns `Ok(false)` for a chat that is already subscribed. If the store
    /// write fails the in-memory insert is rolled back, so the chat's next
    /// message retries the whole onboarding.
    pub async fn add_subscriber(
        &self,
        chat_id: i64,
        display_name: &str,
        first_text: &str,
    ) -> Result<bool> {
        let subscriber = Subscriber { chat_id, display_name: display_name.to_string() };
        {
            let mut subs = self.subscribers.lock().await;
            if subs.iter().any(|s| s.chat_id == chat_id) {
                return Ok(false);
            }
            subs.push(subscriber.clone());
            if let Err(e) = self.store.add_subscriber(&subscriber).await {
                subs.retain(|s| s.chat_id != chat_id);
                return Err(e);
            }
        }

        info!(chat_id, user = %display_name, "New user");
        self.maintainer
            .notify(DebugEvent::plain(format!("✳️ New user: {display_name}\n{first_text}")))
            .await;
        if let Err(e) = self.transport.send_message(chat_id, WELCOME_MESSAGE).await {
            warn!(chat_id, "welcome message failed: {e}");
        }
        Ok(true)
    }

    /// Drops a chat from memory and the store. Idempotent; returns whether it
    /// was subscribed.
    ///
    /// The maintainer hears about the departure even when the store delete
    /// fails; the error is returned afterwards.
    pub async fn remove_subscriber(&self, chat_id: i64) -> Result<bool> {
        let (was_present, persisted) = {
            let mut subs = self.subscribers.lock().await;
            let before = subs.len();
            subs.retain(|s| s.chat_id != chat_id);
            // Store write under the lock keeps memory and store mutations in one order.
            (subs.len() != before, self.store.remove_subscriber(chat_id).await)
        };

        if was_present {
            info!(chat_id, "User left");
            self.maintainer
                .notify(DebugEvent::plain(format!("🚪 User left: {chat_id}")))
                .await;
        }
        persisted?;
        Ok(was_present)
    }

    /// Sends `message` to every subscriber in insertion order, pausing
    /// `send_delay` between sends.
    ///
    /// Permanent failures prune the recipient and the loop continues. A
    /// transient failure aborts the remaining sends and is returned as
    /// `TransientDelivery`.
    pub async fn broadcast(&self, message: &str) -> Result<BroadcastReport> {
        // Snapshot so the listener can subscribe while we are sending.
        let recipients = self.subscribers().await;
        info!("Sending to {} chats", recipients.len());

        let mut report = BroadcastReport::default();
        for (i, sub) in recipients.iter().enumerate() {
            if i > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }

            match self.transport.send_message(sub.chat_id, message).await {
                Ok(()) => report.delivered.push(sub.chat_id),
                Err(SendError::Permanent(reason)) => {
                    info!(chat_id = sub.chat_id, "recipient unreachable, removing: {reason}");
                    if let Err(e) = self.remove_subscriber(sub.chat_id).await {
                        // Memory is already pruned; the store catches up on the next write.
                        warn!(chat_id = sub.chat_id, "subscriber removal not persisted: {e}");
                    }
                    report.removed.push(sub.chat_id);
                }
                Err(SendError::Transient(reason)) => {
                    error!(
                        chat_id = sub.chat_id,
                        delivered = report.delivered.len(),
                        remaining = recipients.len() - i - 1,
                        "broadcast aborted: {reason}"
                    );
                    return Err(AppError::TransientDelivery { chat_id: sub.chat_id, reason });
                }
            }
        }

        info!(
            delivered = report.delivered.len(),
            removed = report.removed.len(),
            "broadcast complete"
        );
        Ok(report)
    }

    /// Direct reply to one chat, with the same failure handling as a broadcast.
    pub async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        match self.transport.send_message(chat_id, text).await {
            Ok(()) => Ok(()),
            Err(SendError::Permanent(reason)) => {
                self.remove_subscriber(chat_id).await?;
                Err(AppError::PermanentDelivery { chat_id, reason })
            }
            Err(SendError::Transient(reason)) => {
                Err(AppError::TransientDelivery { chat_id, reason })
            }
        }
    }
}
