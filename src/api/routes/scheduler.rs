//! Scheduler status and manual trigger

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::api::{error::ApiResult, state::ApiState, types::StatusResponse};

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> ApiResult<Json<StatusResponse>> {
    let nodes = state.storage.list_nodes().await?;
    let enabled_nodes = nodes.iter().filter(|n| n.enabled).count();

    Ok(Json(StatusResponse {
        scheduler: state.scheduler.status(),
        interval_secs: state.scheduler.interval().as_secs(),
        total_nodes: nodes.len(),
        enabled_nodes,
    }))
}

/// POST /api/v1/trigger
///
/// Starts a cycle in the background and answers before it finishes.
pub async fn trigger(State(state): State<ApiState>) -> (StatusCode, Json<Value>) {
    state.scheduler.trigger_now();

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "inspection cycle triggered",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
