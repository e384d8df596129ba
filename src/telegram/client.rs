use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{UPDATES_LONG_POLL_SECS, UPDATES_TIMEOUT_GRACE_SECS};
use crate::error::{AppError, Result};
use crate::telegram::{ChatTransport, InboundMessage, SendError, Update};

/// Message kinds reported as `content_type` for non-text messages.
const CONTENT_KINDS: &[&str] = &[
    "photo", "sticker", "document", "audio", "voice", "video", "video_note", "animation",
    "location", "contact", "poll",
];

/// Bot API envelope: `{"ok": bool, "result": ..., "error_code": .., "description": ..}`.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<serde_json::Value>,
    error_code: Option<u16>,
    description: Option<String>,
}

/// Thin Telegram Bot API client over reqwest.
pub struct TelegramClient {
    base_url: String,
    client: reqwest::Client,
    /// How long Telegram may hold a getUpdates call open.
    long_poll: Duration,
}

impl TelegramClient {
    /// `timeout` bounds sendMessage; getUpdates is bounded by the long poll
    /// plus a grace period instead.
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            client,
            long_poll: Duration::from_secs(UPDATES_LONG_POLL_SECS),
        })
    }

    #[cfg(test)]
    fn with_long_poll(mut self, long_poll: Duration) -> Self {
        self.long_poll = long_poll;
        self
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> std::result::Result<(), SendError> {
        let resp = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(|e| SendError::Transient(format!("request failed: {e}")))?;

        let status = resp.status().as_u16();
        let body: ApiResponse = resp
            .json()
            .await
            .map_err(|e| SendError::Transient(format!("unreadable response ({status}): {e}")))?;

        if body.ok {
            return Ok(());
        }
        let code = body.error_code.unwrap_or(status);
        let description = body.description.unwrap_or_default();
        Err(classify_send_failure(code, &description))
    }

    async fn poll_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let resp = self
            .client
            .get(format!("{}/getUpdates", self.base_url))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.long_poll.as_secs().to_string()),
            ])
            .timeout(self.long_poll + Duration::from_secs(UPDATES_TIMEOUT_GRACE_SECS))
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("getUpdates failed: {e}")))?;
        let body: ApiResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Transport(format!("getUpdates unreadable: {e}")))?;

        if !body.ok {
            return Err(AppError::Transport(format!(
                "getUpdates rejected ({}): {}",
                body.error_code.unwrap_or_default(),
                body.description.unwrap_or_default()
            )));
        }
        let updates = parse_updates(&body.result.unwrap_or_default());
        if !updates.is_empty() {
            debug!(count = updates.len(), "updates received");
        }
        Ok(updates)
    }
}

/// Blocked / deactivated / kicked come back as 403; a deleted chat as 400 "chat not found".
pub fn classify_send_failure(code: u16, description: &str) -> SendError {
    let msg = format!("{code} {description}");
    match code {
        403 => SendError::Permanent(msg),
        400 if description.to_ascii_lowercase().contains("chat not found") => {
            SendError::Permanent(msg)
        }
        _ => SendError::Transient(msg),
    }
}

// ---------------------------------------------------------------------------
// getUpdates payload
// ---------------------------------------------------------------------------

/// One entry of the getUpdates `result` array. `message` stays raw so a
/// message we cannot read still yields its `update_id` and the offset moves on.
#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    chat: RawChat,
    text: Option<String>,
    /// Everything else; the media key names the content type.
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
    username: Option<String>,
}

impl From<RawMessage> for InboundMessage {
    fn from(raw: RawMessage) -> Self {
        let content_type = if raw.text.is_some() {
            "text".to_string()
        } else {
            CONTENT_KINDS
                .iter()
                .find(|k| raw.rest.contains_key(**k))
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        };
        InboundMessage {
            chat_id: raw.chat.id,
            sender_display_name: raw.chat.username.unwrap_or_else(|| raw.chat.id.to_string()),
            text: raw.text,
            content_type,
        }
    }
}

/// Parse the `result` array of getUpdates. Unusable entries are skipped.
pub fn parse_updates(result: &serde_json::Value) -> Vec<Update> {
    let Some(items) = result.as_array() else {
        if !result.is_null() {
            warn!("getUpdates result was not an array");
        }
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match RawUpdate::deserialize(item) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!("skipping unreadable update: {e}");
                None
            }
        })
        .map(|raw| Update {
            update_id: raw.update_id,
            message: raw
                .message
                .and_then(|m| RawMessage::deserialize(&m).ok())
                .map(InboundMessage::from),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_and_deactivated_are_permanent() {
        assert!(matches!(
            classify_send_failure(403, "Forbidden: bot was blocked by the user"),
            SendError::Permanent(_)
        ));
        assert!(matches!(
            classify_send_failure(403, "Forbidden: user is deactivated"),
            SendError::Permanent(_)
        ));
        assert!(matches!(
            classify_send_failure(400, "Bad Request: chat not found"),
            SendError::Permanent(_)
        ));
    }

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert!(matches!(
            classify_send_failure(429, "Too Many Requests: retry after 5"),
            SendError::Transient(_)
        ));
        assert!(matches!(classify_send_failure(502, "Bad Gateway"), SendError::Transient(_)));
        assert!(matches!(
            classify_send_failure(400, "Bad Request: message is too long"),
            SendError::Transient(_)
        ));
    }

    #[test]
    fn parses_text_and_other_updates() {
        let raw = serde_json::json!([
            {"update_id": 10, "message": {"chat": {"id": 42, "username": "alice"}, "text": "hi"}},
            {"update_id": 11, "message": {"chat": {"id": 43}, "sticker": {"file_id": "x"}}},
            {"update_id": 12, "edited_message": {"chat": {"id": 42}, "text": "hi!"}},
            {"no_update_id": true}
        ]);
        let updates = parse_updates(&raw);
        assert_eq!(updates.len(), 3);

        let first = updates[0].message.as_ref().unwrap();
        assert_eq!(first.chat_id, 42);
        assert_eq!(first.sender_display_name, "alice");
        assert_eq!(first.text.as_deref(), Some("hi"));
        assert_eq!(first.content_type, "text");

        let second = updates[1].message.as_ref().unwrap();
        assert_eq!(second.sender_display_name, "43");
        assert_eq!(second.content_type, "sticker");
        assert!(second.text.is_none());

        assert_eq!(updates[2].update_id, 12);
        assert!(updates[2].message.is_none());
    }

    #[test]
    fn message_without_chat_still_advances() {
        let raw = serde_json::json!([{"update_id": 20, "message": {"text": "orphan"}}]);
        let updates = parse_updates(&raw);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_id, 20);
        assert!(updates[0].message.is_none());
    }

    #[tokio::test]
    async fn long_poll_is_not_cut_short_by_send_timeout() {
        use axum::{extract::Query, routing::get, Json, Router};
        use std::collections::HashMap;

        // Holds the request for the requested long-poll time, like Telegram does.
        async fn held_updates(Query(q): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
            let secs = q.get("timeout").and_then(|t| t.parse().ok()).unwrap_or(0);
            tokio::time::sleep(Duration::from_secs(secs)).await;
            Json(serde_json::json!({
                "ok": true,
                "result": [{"update_id": 3, "message": {"chat": {"id": 8}, "text": "hi"}}]
            }))
        }

        let app = Router::new().route("/botTOKEN/getUpdates", get(held_updates));
        let tcp = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(tcp, app).await.unwrap() });

        let client = TelegramClient::new(&format!("http://{addr}"), "TOKEN", Duration::from_millis(200))
            .unwrap()
            .with_long_poll(Duration::from_secs(1));
        let updates = client.poll_updates(0).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].message.as_ref().unwrap().chat_id, 8);
    }

    #[test]
    fn non_array_result_is_empty() {
        assert!(parse_updates(&serde_json::json!({"oops": 1})).is_empty());
        assert!(parse_updates(&serde_json::Value::Null).is_empty());
    }
}
