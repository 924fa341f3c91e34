use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use std::time::Duration;

use super::{created, ApiError};
use crate::models::*;
use crate::{provisioning, status, utils, AppState};

fn validate_address(hostname: &str, ip_address: &str, port: i32) -> Result<(), ApiError> {
    if !utils::is_valid_hostname(hostname) {
        return Err(ApiError::bad_request("Invalid hostname"));
    }
    if !utils::is_valid_ip_address(ip_address) {
        return Err(ApiError::bad_request("Invalid ip_address"));
    }
    if !(1..=65535).contains(&port) {
        return Err(ApiError::bad_request("port must be between 1 and 65535"));
    }
    Ok(())
}

async fn load_server(state: &AppState, id: i64) -> Result<Server, ApiError> {
    state
        .store
        .get_server(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Server"))
}

/// GET /api/servers
pub async fn list_servers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Server>>, ApiError> {
    let servers = state.store.list_servers().await?;
    Ok(Json(servers))
}

/// GET /api/servers/:id
pub async fn get_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Server>, ApiError> {
    Ok(Json(load_server(&state, id).await?))
}

/// POST /api/servers
pub async fn create_server(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateServerRequest>,
) -> Result<(StatusCode, Json<Server>), ApiError> {
    for (field, value) in [
        ("name", &req.name),
        ("hostname", &req.hostname),
        ("ip_address", &req.ip_address),
        ("username", &req.username),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::bad_request(format!("Missing required field: {}", field)));
        }
    }
    validate_address(&req.hostname, &req.ip_address, req.port)?;

    if state.store.get_server_by_name(&req.name).await?.is_some() {
        return Err(ApiError::conflict("A server with this name already exists"));
    }

    let server = state.store.create_server(&req).await?;
    tracing::info!("Registered server {} ({})", server.name, server.ip_address);
    Ok(created(server))
}

/// PUT /api/servers/:id
pub async fn update_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateServerRequest>,
) -> Result<Json<Server>, ApiError> {
    let existing = load_server(&state, id).await?;

    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request("name cannot be empty"));
        }
        if let Some(other) = state.store.get_server_by_name(name).await? {
            if other.id != id {
                return Err(ApiError::conflict("A server with this name already exists"));
            }
        }
    }
    if req.username.as_deref().is_some_and(|u| u.trim().is_empty()) {
        return Err(ApiError::bad_request("username cannot be empty"));
    }
    validate_address(
        req.hostname.as_deref().unwrap_or(&existing.hostname),
        req.ip_address.as_deref().unwrap_or(&existing.ip_address),
        req.port.unwrap_or(existing.port),
    )?;

    let server = state.store.update_server(id, &req).await?;
    Ok(Json(server))
}

/// DELETE /api/servers/:id: execution history keeps referring to the id
pub async fn delete_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_server(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/servers/:id/ping: probe SSH reachability and record status
pub async fn ping_server(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<PingResponse>), ApiError> {
    let server = load_server(&state, id).await?;
    let timeout = Duration::from_secs(state.config.ssh_connect_timeout);

    let resp = status::probe_server(&state.store, state.session.as_ref(), &server, None, timeout).await?;
    let code = if resp.status == "success" {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((code, Json(resp)))
}

/// GET /api/servers/:id/info: basic facts gathered over SSH
pub async fn server_info(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ServerInfoResponse>, ApiError> {
    let server = load_server(&state, id).await?;
    let info = status::gather_server_info(state.session.as_ref(), &server, None, Duration::from_secs(30)).await;
    Ok(Json(ServerInfoResponse {
        server_id: server.id,
        server_name: server.name,
        info,
    }))
}

/// POST /api/servers/:id/setup-ssh: install a generated key using a one-off password
pub async fn setup_ssh(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<SetupSshRequest>,
) -> Result<Json<SetupSshResponse>, ApiError> {
    if req.password.is_empty() {
        return Err(ApiError::bad_request("Password is required for initial SSH setup"));
    }
    let server = load_server(&state, id).await?;
    let timeout = Duration::from_secs(state.config.ssh_connect_timeout.max(30));

    let resp = provisioning::setup_key_auth(
        &state.store,
        &state.keys,
        state.session.as_ref(),
        &server,
        &req.password,
        timeout,
    )
    .await?;
    Ok(Json(resp))
}
