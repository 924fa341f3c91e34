use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::{created, execution_response, ApiError};
use crate::db::get_playbook_templates;
use crate::executor::{Executable, RunParameters, RunRequest};
use crate::models::*;
use crate::AppState;

pub async fn list_playbooks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Playbook>>, ApiError> {
    let playbooks = state.store.list_playbooks().await?;
    Ok(Json(playbooks))
}

/// GET /api/playbooks/templates
pub async fn list_playbook_templates() -> Result<Json<PlaybookTemplatesResponse>, ApiError> {
    Ok(Json(PlaybookTemplatesResponse {
        templates: get_playbook_templates(),
    }))
}

pub async fn get_playbook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Playbook>, ApiError> {
    let playbook = state.store.get_playbook(id).await?
        .ok_or_else(|| ApiError::not_found("Playbook"))?;
    Ok(Json(playbook))
}

pub async fn create_playbook(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePlaybookRequest>,
) -> Result<(StatusCode, Json<Playbook>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Missing required field: name"));
    }
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("Missing required field: content"));
    }
    if state.store.get_playbook_by_name(&req.name).await?.is_some() {
        return Err(ApiError::conflict("A playbook with this name already exists"));
    }
    let playbook = state.store.create_playbook(&req).await?;
    Ok(created(playbook))
}

pub async fn update_playbook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePlaybookRequest>,
) -> Result<Json<Playbook>, ApiError> {
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request("name cannot be empty"));
        }
        if let Some(other) = state.store.get_playbook_by_name(name).await? {
            if other.id != id {
                return Err(ApiError::conflict("A playbook with this name already exists"));
            }
        }
    }
    if req.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(ApiError::bad_request("content cannot be empty"));
    }
    let playbook = state.store.update_playbook(id, &req).await?;
    Ok(Json(playbook))
}

pub async fn delete_playbook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_playbook(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/playbooks/:id/execute
pub async fn execute_playbook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<ExecuteQuery>,
    Json(req): Json<ExecutePlaybookRequest>,
) -> Result<(StatusCode, Json<Execution>), ApiError> {
    let playbook = state.store.get_playbook(id).await?
        .ok_or_else(|| ApiError::not_found("Playbook"))?;

    let handle = state
        .executor
        .start(RunRequest {
            executable: Executable::Playbook(playbook),
            target_ids: req.server_ids,
            params: RunParameters {
                extra_vars: req.extra_vars,
                ..Default::default()
            },
            actor: req.executed_by,
        })
        .await?;

    let execution = if query.wait {
        handle.wait().await?
    } else {
        handle.detach()
    };
    Ok(execution_response(execution))
}
