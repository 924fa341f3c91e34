use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use std::time::Duration;

use super::{created, ApiError};
use crate::models::*;
use crate::provisioning;
use crate::ssh::{ConnectionParams, Credential, SessionResult};
use crate::{utils, AppState};

/// POST /api/ssh-keys/generate
pub async fn generate_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateKeyRequest>,
) -> Result<(StatusCode, Json<SshKeyPair>), ApiError> {
    let name = if req.key_name.trim().is_empty() {
        "id_ed25519".to_string()
    } else {
        req.key_name.trim().to_string()
    };
    let keys = state.keys.clone();
    let pair = tokio::task::spawn_blocking(move || keys.generate_key_pair(&name))
        .await
        .map_err(|e| ApiError::internal(format!("Task join error: {}", e)))??;
    Ok(created(pair))
}

/// GET /api/ssh-keys
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SshKeyPair>>, ApiError> {
    Ok(Json(state.keys.list_keys()?))
}

/// POST /api/ssh-keys/test-connection: reachability check for any host
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TestConnectionRequest>,
) -> Result<Json<SessionResult>, ApiError> {
    if req.hostname.trim().is_empty() || req.username.trim().is_empty() {
        return Err(ApiError::bad_request("hostname and username are required"));
    }
    if !utils::is_valid_hostname(&req.hostname) {
        return Err(ApiError::bad_request("Invalid hostname"));
    }
    let params = ConnectionParams {
        host: req.hostname,
        port: req.port,
        username: req.username,
        credential: Credential::resolve(req.key_path.as_deref(), req.password.as_deref()),
    };
    let result = state
        .session
        .test_connection(&params, Duration::from_secs(req.timeout.clamp(1, 300)))
        .await;
    Ok(Json(result))
}

/// POST /api/ssh-keys/copy-to-server: append a public key using a password
pub async fn copy_to_server(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CopyKeyRequest>,
) -> Result<Json<SessionResult>, ApiError> {
    if req.hostname.trim().is_empty() || req.username.trim().is_empty() {
        return Err(ApiError::bad_request("hostname and username are required"));
    }
    if !utils::is_valid_hostname(&req.hostname) {
        return Err(ApiError::bad_request("Invalid hostname"));
    }
    let params = ConnectionParams {
        host: req.hostname,
        port: req.port,
        username: req.username,
        credential: Credential::resolve(None, req.password.as_deref()),
    };
    let timeout = Duration::from_secs(state.config.ssh_connect_timeout.max(30));
    let result = provisioning::install_public_key(
        state.session.as_ref(),
        &params,
        &req.public_key_content,
        timeout,
    )
    .await?;
    Ok(Json(result))
}
