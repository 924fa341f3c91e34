use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical server liveness values
pub mod server_status {
    pub const ACTIVE: &str = "active";
    pub const ERROR: &str = "error";
    pub const UNKNOWN: &str = "unknown";
}

fn default_ssh_port() -> i32 {
    22
}

/// Server represents a remote machine in the fleet registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    pub hostname: String,
    pub ip_address: String,
    pub port: i32,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub status: String, // active, error, unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ping: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreateServerRequest for registering a new server
#[derive(Debug, Clone, Deserialize)]
pub struct CreateServerRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default = "default_ssh_port")]
    pub port: i32,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub ssh_key_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// UpdateServerRequest carries a partial update; absent fields are left unchanged.
/// An empty `ssh_key_path` clears the stored key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateServerRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub port: Option<i32>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub ssh_key_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// PingResponse is returned by a liveness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String, // success, error
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// ServerInfoResponse holds facts gathered from a server over SSH
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfoResponse {
    pub server_id: i64,
    pub server_name: String,
    pub info: std::collections::BTreeMap<String, String>,
}
