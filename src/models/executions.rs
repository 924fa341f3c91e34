use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical execution status values
pub mod execution_status {
    pub const RUNNING: &str = "running";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}

/// Canonical execution type values
pub mod execution_type {
    pub const COMMAND: &str = "command";
    pub const PLAYBOOK: &str = "playbook";
}

/// Canonical per-target outcome values
pub mod target_status {
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
}

fn default_admin() -> String {
    "admin".to_string()
}

/// Execution is the durable record of one run of a command or playbook
/// against a set of servers. Status only ever moves forward from `running`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub execution_type: String,
    pub target_servers: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playbook_id: Option<i64>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub executed_by: String,
}

impl Execution {
    pub fn is_terminal(&self) -> bool {
        self.status != execution_status::RUNNING
    }

    /// Per-target results of a command execution, if the output holds them
    pub fn target_results(&self) -> Vec<TargetResult> {
        self.output
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

/// CreateExecutionRequest for inserting a new `running` execution
#[derive(Debug, Clone)]
pub struct CreateExecutionRequest {
    pub execution_type: String,
    pub target_servers: Vec<i64>,
    pub command_id: Option<i64>,
    pub playbook_id: Option<i64>,
    pub executed_by: String,
}

/// TargetResult is one server's entry in a command execution's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    pub server_id: i64,
    pub server_name: String,
    pub status: String, // success, error
    pub exit_code: i32,
    pub output: String,
    pub error: String,
}

/// ExecuteCommandRequest for running a saved command across servers
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteCommandRequest {
    #[serde(default)]
    pub server_ids: Vec<i64>,
    #[serde(default = "default_admin")]
    pub executed_by: String,
    /// Overrides the command's stored timeout (seconds) for this run only
    #[serde(default)]
    pub timeout: Option<u64>,
    /// One-off password; never persisted
    #[serde(default)]
    pub password: Option<String>,
}

/// ExecutePlaybookRequest for running a playbook across servers
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutePlaybookRequest {
    #[serde(default)]
    pub server_ids: Vec<i64>,
    #[serde(default)]
    pub extra_vars: Map<String, Value>,
    #[serde(default = "default_admin")]
    pub executed_by: String,
}

/// Query flags for execute endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteQuery {
    #[serde(default)]
    pub wait: bool,
}
