//! In-memory `StateStore` for tests, with switchable write failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::state::StateStore;
use crate::types::Subscriber;

#[derive(Default)]
pub struct MemoryStateStore {
    subscribers: Mutex<Vec<Subscriber>>,
    values: Mutex<HashMap<String, String>>,
    messages: Mutex<Vec<(i64, String, String)>>,
    /// Keys whose `set_value` fails.
    failing_keys: Mutex<Vec<String>>,
    fail_subscriber_writes: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscribers(subs: Vec<Subscriber>) -> Self {
        let store = Self::default();
        *store.subscribers.lock().unwrap() = subs;
        store
    }

    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().push(key.to_string());
    }

    pub fn set_fail_subscriber_writes(&self, fail: bool) {
        self.fail_subscriber_writes.store(fail, Ordering::SeqCst);
    }

    pub fn subscriber_ids(&self) -> Vec<i64> {
        self.subscribers.lock().unwrap().iter().map(|s| s.chat_id).collect()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn messages(&self) -> Vec<(i64, String, String)> {
        self.messages.lock().unwrap().clone()
    }

    fn check_subscriber_write(&self) -> Result<()> {
        if self.fail_subscriber_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("subscriber write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        Ok(self.subscribers.lock().unwrap().clone())
    }

    async fn add_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        self.check_subscriber_write()?;
        let mut subs = self.subscribers.lock().unwrap();
        if !subs.iter().any(|s| s.chat_id == subscriber.chat_id) {
            subs.push(subscriber.clone());
        }
        Ok(())
    }

    async fn remove_subscriber(&self, chat_id: i64) -> Result<()> {
        self.check_subscriber_write()?;
        self.subscribers.lock().unwrap().retain(|s| s.chat_id != chat_id);
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.value(key))
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        if self.failing_keys.lock().unwrap().iter().any(|k| k == key) {
            return Err(AppError::Persistence(format!("write of '{key}' rejected")));
        }
        self.values.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn log_message(&self, chat_id: i64, sender: &str, text: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((chat_id, sender.to_string(), text.to_string()));
        Ok(())
    }
}
