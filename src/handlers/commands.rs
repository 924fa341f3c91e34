use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::{created, execution_response, ApiError};
use crate::executor::{Executable, RunParameters, RunRequest};
use crate::models::*;
use crate::AppState;

pub async fn list_commands(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ShellCommand>>, ApiError> {
    let commands = state.store.list_commands().await?;
    Ok(Json(commands))
}

pub async fn get_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ShellCommand>, ApiError> {
    let command = state.store.get_command(id).await?
        .ok_or_else(|| ApiError::not_found("Command"))?;
    Ok(Json(command))
}

pub async fn create_command(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCommandRequest>,
) -> Result<(StatusCode, Json<ShellCommand>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Missing required field: name"));
    }
    if req.command.trim().is_empty() {
        return Err(ApiError::bad_request("Missing required field: command"));
    }
    if req.timeout <= 0 {
        return Err(ApiError::bad_request("timeout must be a positive number of seconds"));
    }
    if state.store.get_command_by_name(&req.name).await?.is_some() {
        return Err(ApiError::conflict("A command with this name already exists"));
    }
    let command = state.store.create_command(&req).await?;
    Ok(created(command))
}

pub async fn update_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCommandRequest>,
) -> Result<Json<ShellCommand>, ApiError> {
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request("name cannot be empty"));
        }
        if let Some(other) = state.store.get_command_by_name(name).await? {
            if other.id != id {
                return Err(ApiError::conflict("A command with this name already exists"));
            }
        }
    }
    if req.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(ApiError::bad_request("command cannot be empty"));
    }
    if req.timeout.is_some_and(|t| t <= 0) {
        return Err(ApiError::bad_request("timeout must be a positive number of seconds"));
    }
    let command = state.store.update_command(id, &req).await?;
    Ok(Json(command))
}

pub async fn delete_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_command(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/commands/:id/execute: fan the command out to the given servers.
/// Returns 202 with the running record, or the terminal record with `?wait=true`.
pub async fn execute_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<ExecuteQuery>,
    Json(req): Json<ExecuteCommandRequest>,
) -> Result<(StatusCode, Json<Execution>), ApiError> {
    let command = state.store.get_command(id).await?
        .ok_or_else(|| ApiError::not_found("Command"))?;

    let handle = state
        .executor
        .start(RunRequest {
            executable: Executable::Command(command),
            target_ids: req.server_ids,
            params: RunParameters {
                timeout_secs: req.timeout,
                password: req.password,
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
