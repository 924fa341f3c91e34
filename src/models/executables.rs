use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_timeout() -> i32 {
    300
}

fn default_admin() -> String {
    "admin".to_string()
}

// ========== Command Models ==========

/// ShellCommand is a named, reusable shell string run across servers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellCommand {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub command: String,
    pub timeout: i32, // seconds
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommandRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub command: String,
    #[serde(default = "default_timeout")]
    pub timeout: i32,
    #[serde(default = "default_admin")]
    pub created_by: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCommandRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub timeout: Option<i32>,
}

// ========== Playbook Models ==========

/// Playbook is a named, versioned automation document plus default variables.
/// Content is opaque to this service; it is handed to the orchestration delegate as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: String,
    pub variables: Map<String, Value>,
    pub version: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlaybookRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default = "default_admin")]
    pub created_by: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePlaybookRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
}

/// Starter playbook from the built-in catalog
#[derive(Debug, Clone, Serialize)]
pub struct PlaybookTemplate {
    pub name: String,
    pub description: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybookTemplatesResponse {
    pub templates: Vec<PlaybookTemplate>,
}
