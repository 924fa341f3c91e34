use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// AWX list endpoints wrap results in a paginated envelope
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobTemplate {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct LaunchRequest {
    pub extra_vars: Map<String, Value>,
    /// Host pattern restricting the run to the selected servers
    pub limit: String,
}

/// Job created by a template launch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchedJob {
    pub id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub job_template_id: Option<i64>,
}
