//! Alert listing and lifecycle endpoints

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use serde_json::{Value, json};
use tracing::info;

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{AlertStatusUpdate, PageQuery},
};
use crate::model::AlertStats;

/// GET /api/v1/alerts?limit=&offset=
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let alerts = state
        .storage
        .list_alerts(page.limit(), page.offset())
        .await?;

    Ok(Json(json!({
        "count": alerts.len(),
        "limit": page.limit(),
        "offset": page.offset(),
        "alerts": alerts,
    })))
}

/// GET /api/v1/alerts/stats
pub async fn alert_stats(State(state): State<ApiState>) -> ApiResult<Json<AlertStats>> {
    Ok(Json(state.storage.alert_stats().await?))
}

/// PUT /api/v1/alerts/:id/status
pub async fn update_alert_status(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    payload: Result<Json<AlertStatusUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(update) = payload?;
    state.storage.update_alert_status(id, update.status).await?;
    info!(alert_id = id, status = %update.status, "alert status changed");

    Ok(Json(json!({
        "id": id,
        "status": update.status,
    })))
}
