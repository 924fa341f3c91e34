use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::healthcheck))
        // Server registry
        .route(
            "/api/servers",
            get(handlers::servers::list_servers).post(handlers::servers::create_server),
        )
        .route(
            "/api/servers/:id",
            get(handlers::servers::get_server)
                .put(handlers::servers::update_server)
                .delete(handlers::servers::delete_server),
        )
        .route("/api/servers/:id/ping", post(handlers::servers::ping_server))
        .route("/api/servers/:id/info", get(handlers::servers::server_info))
        .route("/api/servers/:id/setup-ssh", post(handlers::servers::setup_ssh))
        // Command library
        .route(
            "/api/commands",
            get(handlers::commands::list_commands).post(handlers::commands::create_command),
        )
        .route(
            "/api/commands/:id",
            get(handlers::commands::get_command)
                .put(handlers::commands::update_command)
                .delete(handlers::commands::delete_command),
        )
        .route("/api/commands/:id/execute", post(handlers::commands::execute_command))
        // Playbook library
        .route(
            "/api/playbooks",
            get(handlers::playbooks::list_playbooks).post(handlers::playbooks::create_playbook),
        )
        .route("/api/playbooks/templates", get(handlers::playbooks::list_playbook_templates))
        .route(
            "/api/playbooks/:id",
            get(handlers::playbooks::get_playbook)
                .put(handlers::playbooks::update_playbook)
                .delete(handlers::playbooks::delete_playbook),
        )
        .route("/api/playbooks/:id/execute", post(handlers::playbooks::execute_playbook))
        // Execution history
        .route("/api/executions", get(handlers::executions::list_executions))
        .route("/api/executions/:id", get(handlers::executions::get_execution))
        // SSH keys
        .route("/api/ssh-keys", get(handlers::ssh_keys::list_keys))
        .route("/api/ssh-keys/generate", post(handlers::ssh_keys::generate_key))
        .route("/api/ssh-keys/test-connection", post(handlers::ssh_keys::test_connection))
        .route("/api/ssh-keys/copy-to-server", post(handlers::ssh_keys::copy_to_server))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Store;
    use crate::executor::FanOutExecutor;
    use crate::provisioning::KeyStore;
    use crate::ssh::testing::{Behaviour, ScriptedSession};
    use crate::ssh::{HostKeyPolicy, RemoteSession};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_config(keys_dir: &std::path::Path) -> Config {
        Config {
            db_path: ":memory:".to_string(),
            db_max_connections: 1,
            listen_addr: "127.0.0.1:0".to_string(),
            ssh_keys_dir: keys_dir.display().to_string(),
            known_hosts_path: keys_dir.join("known_hosts").display().to_string(),
            host_key_policy: HostKeyPolicy::TrustOnFirstUse,
            ssh_connect_timeout: 5,
            fanout_concurrency: 4,
            status_interval: 0,
            playbook_mode: "dry-run".to_string(),
            awx_host: String::new(),
            awx_username: String::new(),
            awx_password: String::new(),
        }
    }

    async fn app(session: ScriptedSession, keys_dir: &std::path::Path) -> Router {
        let store = Store::in_memory().await.unwrap();
        let session: Arc<dyn RemoteSession> = Arc::new(session);
        let executor = FanOutExecutor::new(Arc::new(store.clone()), Arc::new(store.clone()), session.clone());
        build(Arc::new(AppState {
            store,
            config: test_config(keys_dir),
            executor,
            keys: KeyStore::new(keys_dir),
            session,
        }))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn server_body(name: &str, ip: &str) -> Value {
        json!({"name": name, "hostname": name, "ip_address": ip, "username": "root"})
    }

    #[tokio::test]
    async fn test_health() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(ScriptedSession::new(), tmp.path()).await;

        let (status, body) = call(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_server_registry_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(ScriptedSession::new(), tmp.path()).await;

        let (status, body) = call(&app, "POST", "/api/servers", Some(server_body("web01", "10.0.0.1"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "unknown");
        assert_eq!(body["port"], 22);

        let (status, _) = call(&app, "POST", "/api/servers", Some(server_body("web01", "10.0.0.9"))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&app, "POST", "/api/servers", Some(json!({"name": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required field: hostname");

        let (status, _) = call(&app, "GET", "/api/servers/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_execute_command_and_read_history() {
        let tmp = tempfile::tempdir().unwrap();
        let session = ScriptedSession::new().on("10.0.0.2", Behaviour::Exit(2, "boom".into()));
        let app = app(session, tmp.path()).await;

        let (_, a) = call(&app, "POST", "/api/servers", Some(server_body("a", "10.0.0.1"))).await;
        let (_, b) = call(&app, "POST", "/api/servers", Some(server_body("b", "10.0.0.2"))).await;
        let (status, cmd) = call(
            &app,
            "POST",
            "/api/commands",
            Some(json!({"name": "uptime", "command": "uptime"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/commands/{}/execute?wait=true", cmd["id"]);
        let (status, exec) = call(
            &app,
            "POST",
            &uri,
            Some(json!({"server_ids": [a["id"], b["id"], 4242]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(exec["status"], "completed");
        assert_eq!(exec["executed_by"], "admin");
        let output = exec["output"].as_array().unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output[0]["status"], "success");
        assert_eq!(output[1]["status"], "error");
        assert_eq!(output[1]["exit_code"], 2);

        let (status, fetched) = call(&app, "GET", &format!("/api/executions/{}", exec["id"].as_str().unwrap()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], exec["id"]);

        let (_, list) = call(&app, "GET", "/api/executions?limit=5000", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_rejects_empty_targets() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(ScriptedSession::new(), tmp.path()).await;

        let (_, cmd) = call(&app, "POST", "/api/commands", Some(json!({"name": "ls", "command": "ls"}))).await;
        let uri = format!("/api/commands/{}/execute", cmd["id"]);
        let (status, _) = call(&app, "POST", &uri, Some(json!({"server_ids": []}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, list) = call(&app, "GET", "/api/executions", None).await;
        assert!(list.as_array().unwrap().is_empty());

        let (status, _) = call(&app, "POST", "/api/commands/777/execute", Some(json!({"server_ids": [1]}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_generate_key_then_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(ScriptedSession::new(), tmp.path()).await;

        let (status, body) = call(&app, "POST", "/api/ssh-keys/generate", Some(json!({"key_name": "ops"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["public_key_content"].as_str().unwrap().starts_with("ssh-ed25519 "));

        let (status, _) = call(&app, "POST", "/api/ssh-keys/generate", Some(json!({"key_name": "ops"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, keys) = call(&app, "GET", "/api/ssh-keys", None).await;
        assert_eq!(keys.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_server_rejects_empty_username() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(ScriptedSession::new(), tmp.path()).await;
        let (_, server) = call(&app, "POST", "/api/servers", Some(server_body("db01", "10.0.0.5"))).await;
        let uri = format!("/api/servers/{}", server["id"]);

        let (status, body) = call(&app, "PUT", &uri, Some(json!({"username": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "username cannot be empty");

        let (_, fetched) = call(&app, "GET", &uri, None).await;
        assert_eq!(fetched["username"], "root");

        let (status, body) = call(&app, "PUT", &uri, Some(json!({"username": "deploy"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "deploy");
    }

    #[tokio::test]
    async fn test_playbook_templates_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let app = app(ScriptedSession::new(), tmp.path()).await;

        let (status, body) = call(&app, "GET", "/api/playbooks/templates", None).await;
        assert_eq!(status, StatusCode::OK);
        let templates = body["templates"].as_array().unwrap();
        assert_eq!(templates.len(), 3);
        for t in templates {
            assert!(t["name"].is_string());
            assert!(t["description"].is_string());
            assert!(t["content"].as_str().unwrap().contains("hosts: all"));
        }
        assert_eq!(templates[1]["name"], "Docker Installation");

        // The catalog is not part of the stored library
        let (_, stored) = call(&app, "GET", "/api/playbooks", None).await;
        assert!(stored.as_array().unwrap().is_empty());
    }
}
