use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::error::Result;
use crate::state::StateStore;
use crate::types::Subscriber;

/// SQLite-backed state: `subscribers`, `kv` and `messages` tables.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Opens (creating if missing) the database file and runs migrations.
    pub async fn open(db_path: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;
        let store = Self::from_pool(pool).await?;
        info!("Database ready at {db_path}");
        Ok(store)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query("SELECT chat_id, display_name FROM subscribers ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| {
                Ok(Subscriber {
                    chat_id: r.try_get("chat_id")?,
                    display_name: r.try_get("display_name")?,
                })
            })
            .collect()
    }

    async fn add_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO subscribers (chat_id, display_name, joined_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(subscriber.chat_id)
        .bind(&subscriber.display_name)
        .bind(now_ns() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_subscriber(&self, chat_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM subscribers WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(r) => Some(r.try_get("value")?),
            None => None,
        })
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn log_message(&self, chat_id: i64, sender: &str, text: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages (chat_id, sender, text, received_at) VALUES (?, ?, ?, ?)",
        )
        .bind(chat_id)
        .bind(sender)
        .bind(text)
        .bind(now_ns() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStateStore {
        // One connection: every `sqlite::memory:` connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteStateStore::from_pool(pool).await.unwrap()
    }

    fn sub(chat_id: i64, name: &str) -> Subscriber {
        Subscriber { chat_id, display_name: name.to_string() }
    }

    #[tokio::test]
    async fn subscribers_keep_insertion_order() {
        let store = memory_store().await;
        store.add_subscriber(&sub(30, "c")).await.unwrap();
        store.add_subscriber(&sub(10, "a")).await.unwrap();
        store.add_subscriber(&sub(20, "b")).await.unwrap();
        let ids: Vec<i64> =
            store.list_subscribers().await.unwrap().iter().map(|s| s.chat_id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
    }

    #[tokio::test]
    async fn duplicate_add_and_repeat_remove_are_harmless() {
        let store = memory_store().await;
        store.add_subscriber(&sub(1, "alice")).await.unwrap();
        store.add_subscriber(&sub(1, "alice-again")).await.unwrap();
        let subs = store.list_subscribers().await.unwrap();
        assert_eq!(subs, vec![sub(1, "alice")]);

        store.remove_subscriber(1).await.unwrap();
        store.remove_subscriber(1).await.unwrap();
        assert!(store.list_subscribers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn values_upsert() {
        let store = memory_store().await;
        assert_eq!(store.get_value("last_pwn_time").await.unwrap(), None);
        store.set_value("last_pwn_time", "09:00").await.unwrap();
        store.set_value("last_pwn_time", "10:00").await.unwrap();
        assert_eq!(store.get_value("last_pwn_time").await.unwrap(), Some("10:00".to_string()));
    }

    #[tokio::test]
    async fn messages_are_archived() {
        let store = memory_store().await;
        store.log_message(7, "bob", "hi").await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
