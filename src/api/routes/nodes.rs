//! Fleet inventory and inspection history endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde_json::{Value, json};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::PageQuery,
};

/// GET /api/v1/nodes
pub async fn list_nodes(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let nodes = state.storage.list_nodes().await?;

    Ok(Json(json!({
        "count": nodes.len(),
        "nodes": nodes,
    })))
}

/// GET /api/v1/inspections/latest
///
/// Newest inspection of every node that has been inspected
pub async fn latest_inspections(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let inspections = state.storage.latest_inspections().await?;

    Ok(Json(json!({
        "count": inspections.len(),
        "inspections": inspections,
    })))
}

/// GET /api/v1/nodes/:id/inspections?limit=
pub async fn node_inspections(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let node = state
        .storage
        .get_node(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("node {id} not found")))?;

    let inspections = state
        .storage
        .inspections_for_node(node.id, page.limit())
        .await?;

    Ok(Json(json!({
        "node": node,
        "count": inspections.len(),
        "inspections": inspections,
    })))
}
