pub mod sqlite;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Subscriber;

pub use sqlite::SqliteStateStore;

/// Durable subscriber list plus a small key/value area for checkpoints.
///
/// Calls are independent: there is no atomicity across them, and callers
/// tolerate a write that landed in memory but not here until the next
/// successful write.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>>;
    async fn add_subscriber(&self, subscriber: &Subscriber) -> Result<()>;
    /// Idempotent.
    async fn remove_subscriber(&self, chat_id: i64) -> Result<()>;
    async fn get_value(&self, key: &str) -> Result<Option<String>>;
    async fn set_value(&self, key: &str, value: &str) -> Result<()>;
    /// Archive an inbound text message.
    async fn log_message(&self, chat_id: i64, sender: &str, text: &str) -> Result<()>;
}
