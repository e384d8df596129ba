pub mod client;
pub mod listener;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::Result;

pub use client::TelegramClient;
pub use listener::Listener;

/// Outcome of a failed send, as far as the recipient is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Blocked, deactivated or deleted: retrying will not help.
    #[error("permanent: {0}")]
    Permanent(String),
    /// Network trouble, rate limits, server errors.
    #[error("transient: {0}")]
    Transient(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub sender_display_name: String,
    /// Present for text messages only.
    pub text: Option<String>,
    /// "text", "photo", "sticker", ...
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_id: i64,
    /// None for update kinds we do not handle (edits, callbacks, ...).
    pub message: Option<InboundMessage>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> std::result::Result<(), SendError>;

    /// Long-polls for updates with `update_id >= offset`.
    async fn poll_updates(&self, offset: i64) -> Result<Vec<Update>>;
}
