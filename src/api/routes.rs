use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::health::{HealthSnapshot, HealthState};
use crate::config::{LAST_PWN_KEY, LAST_RANK_KEY};
use crate::detector::DeltaEngine;
use crate::dispatch::Dispatcher;
use crate::error::AppError;
use crate::state::StateStore;
use crate::types::{Checkpoint, Subscriber};

#[derive(Clone)]
pub struct ApiState {
    pub health: Arc<HealthState>,
    pub dispatcher: Arc<Dispatcher>,
    pub engine: Arc<DeltaEngine>,
    pub store: Arc<dyn StateStore>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/checkpoint", get(get_checkpoint))
        .route("/subscribers", get(get_subscribers))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub supervisor: HealthSnapshot,
    pub subscribers: usize,
}

/// In-memory checkpoint next to what the store holds; they differ while a
/// failed write is outstanding.
#[derive(Serialize)]
pub struct CheckpointResponse {
    pub memory: Checkpoint,
    pub persisted: Checkpoint,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        supervisor: state.health.snapshot(),
        subscribers: state.dispatcher.subscriber_count().await,
    })
}

async fn get_checkpoint(
    State(state): State<ApiState>,
) -> Result<Json<CheckpointResponse>, AppError> {
    let persisted = Checkpoint {
        last_seen_timestamp: state.store.get_value(LAST_PWN_KEY).await?,
        last_seen_rank: state.store.get_value(LAST_RANK_KEY).await?,
    };
    Ok(Json(CheckpointResponse {
        memory: state.engine.checkpoint().await,
        persisted,
    }))
}

async fn get_subscribers(State(state): State<ApiState>) -> Json<Vec<Subscriber>> {
    Json(state.dispatcher.subscribers().await)
}
