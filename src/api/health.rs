//! Shared health state for the /health endpoint.
//! Updated by the Supervisor, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::supervisor::SupervisorState;

#[derive(Default)]
pub struct HealthState {
    state: Mutex<SupervisorState>,
    /// Poll cycles that completed without a fault.
    polls_ok: AtomicU64,
    faults: AtomicU64,
    /// Messages handed to a broadcast (digests + rank notices).
    messages_broadcast: AtomicU64,
    /// Nanosecond timestamp of the last successful poll (0 = none).
    last_poll_at_ns: AtomicU64,
    last_fault: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub state: SupervisorState,
    pub polls_ok: u64,
    pub faults: u64,
    pub messages_broadcast: u64,
    pub last_poll_at_ns: u64,
    pub last_fault: Option<String>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, state: SupervisorState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn record_poll_ok(&self, at_ns: u64, messages: u64) {
        self.polls_ok.fetch_add(1, Ordering::Relaxed);
        self.messages_broadcast.fetch_add(messages, Ordering::Relaxed);
        self.last_poll_at_ns.store(at_ns, Ordering::Relaxed);
    }

    pub fn record_fault(&self, message: String) {
        self.faults.fetch_add(1, Ordering::Relaxed);
        *self.last_fault.lock().unwrap_or_else(|p| p.into_inner()) = Some(message);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: self.state(),
            polls_ok: self.polls_ok.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            messages_broadcast: self.messages_broadcast.load(Ordering::Relaxed),
            last_poll_at_ns: self.last_poll_at_ns.load(Ordering::Relaxed),
            last_fault: self.last_fault.lock().unwrap_or_else(|p| p.into_inner()).clone(),
        }
    }
}
