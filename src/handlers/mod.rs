pub mod commands;
pub mod executions;
pub mod playbooks;
pub mod servers;
pub mod ssh_keys;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::executor::RunError;
use crate::models::Execution;
use crate::provisioning::ProvisionError;

/// Limit query for list endpoints. Default 100, max 1000.
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_page_limit")]
    pub limit: i32,
}

impl LimitQuery {
    /// Clamp limit to [1, 1000]
    pub fn sanitize(&self) -> i32 {
        self.limit.clamp(1, 1000)
    }
}

fn default_page_limit() -> i32 {
    100
}

/// Error response - {"error": "message"}
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// API error type
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{} not found", resource),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse::new(self.message)),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Check for typed NotFoundError first (no fragile string matching)
        if let Some(nf) = err.downcast_ref::<crate::db::NotFoundError>() {
            return Self::not_found(&nf.resource);
        }
        Self::internal(err.to_string())
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match &err {
            RunError::NoTargets => Self::bad_request(err.to_string()),
            RunError::Orchestration {
                execution_id: Some(id),
                ..
            } => Self::internal(format!("{} (execution {})", err, id)),
            RunError::Orchestration { .. } => Self::internal(err.to_string()),
        }
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::InvalidKeyName(_)
            | ProvisionError::InvalidPublicKey(_)
            | ProvisionError::InstallFailed(_) => Self::bad_request(err.to_string()),
            ProvisionError::KeyExists(_) => Self::conflict(err.to_string()),
            ProvisionError::Store(e) => e.into(),
            ProvisionError::Encoding(_) | ProvisionError::Io(_) => Self::internal(err.to_string()),
        }
    }
}

/// Response helper: return 201 Created with JSON body
pub fn created<T: Serialize>(item: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(item))
}

/// 200 with a terminal record, 202 while it is still running
pub fn execution_response(execution: Execution) -> (StatusCode, Json<Execution>) {
    let status = if execution.is_terminal() {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    (status, Json(execution))
}

/// Healthcheck endpoint: returns 200 OK with status
pub async fn healthcheck() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "fleet-runner",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
