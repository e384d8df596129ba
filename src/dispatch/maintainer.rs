use std::sync::Arc;

use tracing::warn;

use crate::telegram::ChatTransport;
use crate::types::{DebugEvent, Severity};

/// Best-effort debug line to the maintainer's chat.
/// Disabled without a maintainer id; send failures are logged and dropped.
pub struct MaintainerChannel {
    transport: Arc<dyn ChatTransport>,
    chat_id: Option<i64>,
}

impl MaintainerChannel {
    pub fn new(transport: Arc<dyn ChatTransport>, chat_id: Option<i64>) -> Self {
        Self { transport, chat_id }
    }

    pub fn is_enabled(&self) -> bool {
        self.chat_id.is_some()
    }

    pub async fn notify(&self, event: DebugEvent) {
        let Some(chat_id) = self.chat_id else {
            return;
        };
        if let Err(e) = self.transport.send_message(chat_id, &event.render()).await {
            warn!(chat_id, "maintainer notification dropped: {e}");
        }
    }

    pub async fn send(&self, severity: Severity, message: impl Into<String>) {
        self.notify(DebugEvent::new(severity, message)).await;
    }
}
