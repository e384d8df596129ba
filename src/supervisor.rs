use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use crate::api::health::HealthState;
use crate::detector::DeltaEngine;
use crate::dispatch::{Dispatcher, MaintainerChannel};
use crate::error::{AppError, Result};
use crate::scoreboard::{parse, ScoreboardSource};
use crate::types::Severity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    #[default]
    Idle,
    Polling,
    Sleeping,
    Faulted,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    Start,
    CycleSucceeded,
    CycleFailed,
    FaultReported,
    SleepElapsed,
    Interrupt,
}

/// Transition table. Pairs not listed leave the state unchanged; `Stopped`
/// is terminal.
pub fn transition(state: SupervisorState, event: SupervisorEvent) -> SupervisorState {
    use SupervisorEvent as E;
    use SupervisorState as S;
    match (state, event) {
        (S::Stopped, _) => S::Stopped,
        (_, E::Interrupt) => S::Stopped,
        (S::Idle, E::Start) => S::Polling,
        (S::Polling, E::CycleSucceeded) => S::Sleeping,
        (S::Polling, E::CycleFailed) => S::Faulted,
        (S::Faulted, E::FaultReported) => S::Sleeping,
        (S::Sleeping, E::SleepElapsed) => S::Polling,
        (s, _) => s,
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub new_entries: usize,
    pub rank_changed: bool,
    pub messages_sent: usize,
}

/// Drives fetch → parse → diff → dispatch on a fixed period and keeps the
/// process alive through any fault a cycle raises.
pub struct Supervisor {
    source: Arc<dyn ScoreboardSource>,
    engine: Arc<DeltaEngine>,
    dispatcher: Arc<Dispatcher>,
    maintainer: Arc<MaintainerChannel>,
    health: Arc<HealthState>,
    poll_interval: Duration,
    restart_cooldown: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn ScoreboardSource>,
        engine: Arc<DeltaEngine>,
        dispatcher: Arc<Dispatcher>,
        maintainer: Arc<MaintainerChannel>,
        health: Arc<HealthState>,
        poll_interval: Duration,
        restart_cooldown: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            engine,
            dispatcher,
            maintainer,
            health,
            poll_interval,
            restart_cooldown,
            shutdown,
        }
    }

    /// One poll cycle. Any error aborts the rest of the cycle.
    ///
    /// Checkpoint write failures do not stop delivery of what was found; they
    /// are returned after the broadcasts so the fault still gets reported.
    pub async fn poll_once(&self) -> Result<CycleReport> {
        let raw = self.source.fetch().await?;
        let (feed, table) = parse(&raw)?;
        let delta = self.engine.observe(&feed, &table).await;

        let messages = delta.messages();
        for message in &messages {
            let report = self.dispatcher.broadcast(message).await?;
            for chat_id in &report.removed {
                info!(chat_id, "pruned during broadcast");
            }
        }

        if let Some(e) = delta.write_errors.into_iter().next() {
            return Err(e);
        }

        let report = CycleReport {
            new_entries: delta.news.len(),
            rank_changed: delta.rank_change.is_some(),
            messages_sent: messages.len(),
        };
        info!(
            feed = feed.len(),
            rows = table.len(),
            new_entries = report.new_entries,
            rank_changed = report.rank_changed,
            "poll cycle complete"
        );
        Ok(report)
    }

    /// Runs until the shutdown flag flips. Never returns on a fault.
    pub async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        let mut state = transition(SupervisorState::Idle, SupervisorEvent::Start);
        let mut sleep_for = self.poll_interval;
        let mut fault: Option<AppError> = None;

        loop {
            if *shutdown.borrow() {
                state = transition(state, SupervisorEvent::Interrupt);
            }
            self.health.set_state(state);

            let event = match state {
                SupervisorState::Stopped => break,
                SupervisorState::Idle => SupervisorEvent::Start,
                SupervisorState::Polling => {
                    let outcome = tokio::select! {
                        r = self.poll_once() => r,
                        _ = shutdown.changed() => {
                            state = transition(state, SupervisorEvent::Interrupt);
                            continue;
                        }
                    };
                    match outcome {
                        Ok(report) => {
                            self.health.record_poll_ok(now_ns(), report.messages_sent as u64);
                            sleep_for = self.poll_interval;
                            SupervisorEvent::CycleSucceeded
                        }
                        Err(e) => {
                            fault = Some(e);
                            SupervisorEvent::CycleFailed
                        }
                    }
                }
                SupervisorState::Faulted => {
                    if let Some(e) = fault.take() {
                        self.report_fault(&e).await;
                    }
                    sleep_for = self.restart_cooldown;
                    SupervisorEvent::FaultReported
                }
                SupervisorState::Sleeping => {
                    tokio::select! {
                        _ = tokio::time::sleep(sleep_for) => SupervisorEvent::SleepElapsed,
                        _ = shutdown.changed() => SupervisorEvent::Interrupt,
                    }
                }
            };
            state = transition(state, event);
        }

        self.health.set_state(SupervisorState::Stopped);
        info!("supervisor stopped");
    }

    async fn report_fault(&self, e: &AppError) {
        let msg = format!("Caught an exception: {e}");
        error!(cooldown_secs = self.restart_cooldown.as_secs(), "{msg}");
        self.health.record_fault(e.to_string());
        self.maintainer.send(Severity::Error, msg).await;
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
