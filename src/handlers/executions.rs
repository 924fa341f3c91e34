use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use super::{ApiError, LimitQuery};
use crate::models::Execution;
use crate::AppState;

/// GET /api/executions: newest first
pub async fn list_executions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Execution>>, ApiError> {
    let executions = state.store.list_executions(query.sanitize()).await?;
    Ok(Json(executions))
}

/// GET /api/executions/:id
pub async fn get_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Execution>, ApiError> {
    let execution = state
        .store
        .get_execution(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Execution"))?;
    Ok(Json(execution))
}
