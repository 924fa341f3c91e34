mod commands;
mod executions;
mod playbooks;
pub(crate) mod row_helpers;
mod seeds;
mod servers;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

pub use seeds::get_playbook_templates;

use crate::executor::{ExecutionLog, TargetRegistry};
use crate::models::*;

/// Typed error for "resource not found", downcast by the API error handler
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Create a new database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }
        }
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database, used by tests. A single connection that
    /// never expires keeps the database alive for the store's lifetime.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ========== Server Operations ==========

    pub async fn list_servers(&self) -> Result<Vec<Server>> {
        servers::ServerRepo::list(&self.pool).await
    }

    pub async fn get_server(&self, id: i64) -> Result<Option<Server>> {
        servers::ServerRepo::get(&self.pool, id).await
    }

    pub async fn get_server_by_name(&self, name: &str) -> Result<Option<Server>> {
        servers::ServerRepo::get_by_name(&self.pool, name).await
    }

    pub async fn create_server(&self, req: &CreateServerRequest) -> Result<Server> {
        servers::ServerRepo::create(&self.pool, req).await
    }

    pub async fn update_server(&self, id: i64, req: &UpdateServerRequest) -> Result<Server> {
        servers::ServerRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_server(&self, id: i64) -> Result<()> {
        servers::ServerRepo::delete(&self.pool, id).await
    }

    pub async fn set_server_key_path(&self, id: i64, path: &str) -> Result<()> {
        servers::ServerRepo::set_key_path(&self.pool, id, path).await
    }

    pub async fn record_server_probe(&self, id: i64, status: &str) -> Result<()> {
        servers::ServerRepo::record_probe(&self.pool, id, status).await
    }

    // ========== Command Operations ==========

    pub async fn list_commands(&self) -> Result<Vec<ShellCommand>> {
        commands::CommandRepo::list(&self.pool).await
    }

    pub async fn get_command(&self, id: i64) -> Result<Option<ShellCommand>> {
        commands::CommandRepo::get(&self.pool, id).await
    }

    pub async fn get_command_by_name(&self, name: &str) -> Result<Option<ShellCommand>> {
        commands::CommandRepo::get_by_name(&self.pool, name).await
    }

    pub async fn create_command(&self, req: &CreateCommandRequest) -> Result<ShellCommand> {
        commands::CommandRepo::create(&self.pool, req).await
    }

    pub async fn update_command(&self, id: i64, req: &UpdateCommandRequest) -> Result<ShellCommand> {
        commands::CommandRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_command(&self, id: i64) -> Result<()> {
        commands::CommandRepo::delete(&self.pool, id).await
    }

    // ========== Playbook Operations ==========

    pub async fn list_playbooks(&self) -> Result<Vec<Playbook>> {
        playbooks::PlaybookRepo::list(&self.pool).await
    }

    pub async fn get_playbook(&self, id: i64) -> Result<Option<Playbook>> {
        playbooks::PlaybookRepo::get(&self.pool, id).await
    }

    pub async fn get_playbook_by_name(&self, name: &str) -> Result<Option<Playbook>> {
        playbooks::PlaybookRepo::get_by_name(&self.pool, name).await
    }

    pub async fn create_playbook(&self, req: &CreatePlaybookRequest) -> Result<Playbook> {
        playbooks::PlaybookRepo::create(&self.pool, req).await
    }

    pub async fn update_playbook(&self, id: i64, req: &UpdatePlaybookRequest) -> Result<Playbook> {
        playbooks::PlaybookRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_playbook(&self, id: i64) -> Result<()> {
        playbooks::PlaybookRepo::delete(&self.pool, id).await
    }

    // ========== Execution Operations ==========

    pub async fn create_execution(&self, req: &CreateExecutionRequest) -> Result<Execution> {
        let id = uuid::Uuid::new_v4().to_string();
        executions::ExecutionRepo::create(&self.pool, &id, req).await
    }

    pub async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        executions::ExecutionRepo::get(&self.pool, id).await
    }

    pub async fn list_executions(&self, limit: i32) -> Result<Vec<Execution>> {
        executions::ExecutionRepo::list_recent(&self.pool, limit).await
    }

    pub async fn list_running_executions(&self) -> Result<Vec<Execution>> {
        executions::ExecutionRepo::list_running(&self.pool).await
    }

    pub async fn complete_execution(&self, id: &str, output: &Value) -> Result<Execution> {
        executions::ExecutionRepo::complete(&self.pool, id, output).await
    }

    pub async fn fail_execution(&self, id: &str, error: &str) -> Result<Execution> {
        executions::ExecutionRepo::fail(&self.pool, id, error).await
    }
}

// ========== Executor Seams ==========

#[async_trait]
impl ExecutionLog for Store {
    async fn create_execution(&self, req: &CreateExecutionRequest) -> Result<Execution> {
        Store::create_execution(self, req).await
    }

    async fn complete_execution(&self, id: &str, output: &Value) -> Result<Execution> {
        Store::complete_execution(self, id, output).await
    }

    async fn fail_execution(&self, id: &str, error: &str) -> Result<Execution> {
        Store::fail_execution(self, id, error).await
    }
}

#[async_trait]
impl TargetRegistry for Store {
    async fn resolve_target(&self, id: i64) -> Result<Option<Server>> {
        self.get_server(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server_req(name: &str) -> CreateServerRequest {
        CreateServerRequest {
            name: name.to_string(),
            hostname: format!("{}.lab", name),
            ip_address: "10.0.0.1".to_string(),
            port: 22,
            username: "root".to_string(),
            ssh_key_path: None,
            description: Some("rack 4".to_string()),
            tags: vec!["web".to_string(), "prod".to_string()],
        }
    }

    fn command_execution() -> CreateExecutionRequest {
        CreateExecutionRequest {
            execution_type: execution_type::COMMAND.to_string(),
            target_servers: vec![3, 1, 2],
            command_id: Some(7),
            playbook_id: None,
            executed_by: "ops".to_string(),
        }
    }

    #[tokio::test]
    async fn test_server_crud() {
        let store = Store::in_memory().await.unwrap();

        let created = store.create_server(&server_req("web-01")).await.unwrap();
        assert_eq!(created.status, server_status::UNKNOWN);
        assert_eq!(created.tags, vec!["web", "prod"]);
        assert!(created.last_ping.is_none());
        assert!(created.ssh_key_path.is_none());

        let updated = store
            .update_server(
                created.id,
                &UpdateServerRequest {
                    port: Some(2222),
                    tags: Some(vec![]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.port, 2222);
        assert!(updated.tags.is_empty());
        assert_eq!(updated.hostname, "web-01.lab");
        assert_eq!(updated.description.as_deref(), Some("rack 4"));

        assert!(store.get_server_by_name("web-01").await.unwrap().is_some());
        store.delete_server(created.id).await.unwrap();
        assert!(store.get_server(created.id).await.unwrap().is_none());

        let err = store.delete_server(created.id).await.unwrap_err();
        assert!(err.downcast_ref::<NotFoundError>().is_some());
    }

    #[tokio::test]
    async fn test_probe_touches_only_liveness() {
        let store = Store::in_memory().await.unwrap();
        let server = store.create_server(&server_req("db-01")).await.unwrap();

        store.record_server_probe(server.id, server_status::ACTIVE).await.unwrap();

        let probed = store.get_server(server.id).await.unwrap().unwrap();
        assert_eq!(probed.status, server_status::ACTIVE);
        assert!(probed.last_ping.is_some());
        assert_eq!(probed.name, server.name);

        // Edits keep the probe result
        let edited = store
            .update_server(
                server.id,
                &UpdateServerRequest {
                    description: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.status, server_status::ACTIVE);
        assert!(edited.description.is_none());
    }

    #[tokio::test]
    async fn test_playbook_version_bumps_on_content_change() {
        let store = Store::in_memory().await.unwrap();
        let pb = store
            .create_playbook(&CreatePlaybookRequest {
                name: "patch".to_string(),
                description: None,
                content: "- hosts: all".to_string(),
                variables: json!({"reboot": false}).as_object().cloned().unwrap(),
                created_by: "admin".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(pb.version, 1);
        assert_eq!(pb.variables["reboot"], json!(false));

        let renamed = store
            .update_playbook(
                pb.id,
                &UpdatePlaybookRequest {
                    name: Some("patch-all".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.version, 1);

        let edited = store
            .update_playbook(
                pb.id,
                &UpdatePlaybookRequest {
                    content: Some("- hosts: web".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.version, 2);
        assert_eq!(edited.name, "patch-all");
    }

    #[tokio::test]
    async fn test_execution_lifecycle_is_forward_only() {
        let store = Store::in_memory().await.unwrap();

        let running = store.create_execution(&command_execution()).await.unwrap();
        assert_eq!(running.status, execution_status::RUNNING);
        assert_eq!(running.target_servers, vec![3, 1, 2]);
        assert!(running.completed_at.is_none());
        assert!(running.output.is_none());

        let done = store.complete_execution(&running.id, &json!([])).await.unwrap();
        assert_eq!(done.status, execution_status::COMPLETED);
        assert!(done.completed_at.is_some());
        assert!(done.error_message.is_none());

        // Terminal states are immutable
        assert!(store.fail_execution(&running.id, "late").await.is_err());
        assert!(store.complete_execution(&running.id, &json!(["x"])).await.is_err());
        let reread = store.get_execution(&running.id).await.unwrap().unwrap();
        assert_eq!(reread.status, execution_status::COMPLETED);
        assert_eq!(reread.output, Some(json!([])));

        let missing = store.fail_execution("nope", "x").await.unwrap_err();
        assert!(missing.downcast_ref::<NotFoundError>().is_some());
    }

    #[tokio::test]
    async fn test_executions_listed_newest_first() {
        let store = Store::in_memory().await.unwrap();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(store.create_execution(&command_execution()).await.unwrap().id);
        }

        let listed: Vec<String> = store.list_executions(10).await.unwrap().into_iter().map(|e| e.id).collect();
        ids.reverse();
        assert_eq!(listed, ids);
        assert_eq!(store.list_executions(2).await.unwrap().len(), 2);

        store.fail_execution(&ids[0], "boom").await.unwrap();
        assert_eq!(store.list_running_executions().await.unwrap().len(), 2);
    }
}
