//! Recording `ChatTransport` with per-chat failure injection, and a scripted
//! `ScoreboardSource`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::scoreboard::ScoreboardSource;
use crate::telegram::{ChatTransport, InboundMessage, SendError, Update};

#[derive(Clone, Copy)]
enum Failure {
    Permanent,
    Transient,
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(i64, String)>>,
    failures: Mutex<HashMap<i64, Failure>>,
    updates: Mutex<VecDeque<Vec<Update>>>,
    offsets: Mutex<Vec<i64>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_permanent(&self, chat_id: i64) {
        self.failures.lock().unwrap().insert(chat_id, Failure::Permanent);
    }

    pub fn fail_transient(&self, chat_id: i64) {
        self.failures.lock().unwrap().insert(chat_id, Failure::Transient);
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text)
            .collect()
    }

    /// Queue one getUpdates batch.
    pub fn push_updates(&self, batch: Vec<Update>) {
        self.updates.lock().unwrap().push_back(batch);
    }

    pub fn offsets(&self) -> Vec<i64> {
        self.offsets.lock().unwrap().clone()
    }
}

pub fn text_update(update_id: i64, chat_id: i64, name: &str, text: &str) -> Update {
    Update {
        update_id,
        message: Some(InboundMessage {
            chat_id,
            sender_display_name: name.to_string(),
            text: Some(text.to_string()),
            content_type: "text".to_string(),
        }),
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> std::result::Result<(), SendError> {
        let failure = self.failures.lock().unwrap().get(&chat_id).copied();
        match failure {
            Some(Failure::Permanent) => {
                Err(SendError::Permanent("403 Forbidden: bot was blocked by the user".into()))
            }
            Some(Failure::Transient) => Err(SendError::Transient("502 Bad Gateway".into())),
            None => {
                self.sent.lock().unwrap().push((chat_id, text.to_string()));
                Ok(())
            }
        }
    }

    async fn poll_updates(&self, offset: i64) -> Result<Vec<Update>> {
        self.offsets.lock().unwrap().push(offset);
        let batch = self.updates.lock().unwrap().pop_front();
        match batch {
            Some(b) => Ok(b),
            None => {
                // Behave like an idle long poll.
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Serves scripted pages (`Err` becomes a fetch error), then repeats the last one.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    last: Mutex<Option<std::result::Result<String, String>>>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<std::result::Result<&str, &str>>) -> Self {
        let source = Self::default();
        *source.script.lock().unwrap() = script
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        source
    }

    /// When each fetch happened, on the tokio clock.
    pub fn fetch_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScoreboardSource for ScriptedSource {
    async fn fetch(&self) -> Result<String> {
        self.calls.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(n) = next {
            *last = Some(n);
        }
        match last.clone() {
            Some(Ok(body)) => Ok(body),
            Some(Err(e)) => Err(AppError::Fetch(e)),
            None => Err(AppError::Fetch("nothing scripted".into())),
        }
    }
}
