use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::db::Store;
use crate::models::{server_status, PingResponse, Server};
use crate::provisioning;
use crate::ssh::RemoteSession;

/// Facts gathered by the server info endpoint, keyed by the name they are reported under
const INFO_COMMANDS: &[(&str, &str)] = &[
    ("hostname", "hostname"),
    ("os_info", "cat /etc/os-release | head -5"),
    ("uptime", "uptime"),
    ("disk_usage", "df -h /"),
    ("memory_info", "free -h"),
    ("cpu_info", "nproc"),
];

/// Probe one server over SSH and record the outcome (status + last_ping).
pub async fn probe_server(
    store: &Store,
    session: &dyn RemoteSession,
    server: &Server,
    password: Option<&str>,
    timeout: Duration,
) -> anyhow::Result<PingResponse> {
    let params = provisioning::connection_params(server, password);
    let result = session.test_connection(&params, timeout).await;

    let (status, response) = if result.success {
        (
            server_status::ACTIVE,
            PingResponse {
                status: "success".to_string(),
                message: "Server is reachable".to_string(),
                output: Some(result.output.trim().to_string()),
            },
        )
    } else {
        (
            server_status::ERROR,
            PingResponse {
                status: "error".to_string(),
                message: format!("SSH connection failed: {}", result.error.trim()),
                output: None,
            },
        )
    };

    store.record_server_probe(server.id, status).await?;
    Ok(response)
}

/// Run the info commands concurrently; a failing command reports its error in place.
pub async fn gather_server_info(
    session: &dyn RemoteSession,
    server: &Server,
    password: Option<&str>,
    timeout: Duration,
) -> BTreeMap<String, String> {
    let params = provisioning::connection_params(server, password);
    let runs = INFO_COMMANDS.iter().map(|(key, command)| {
        let params = &params;
        async move {
            let result = session.connect_and_run(params, command, timeout).await;
            let value = if result.success {
                result.output.trim().to_string()
            } else {
                format!("Error: {}", result.error.trim())
            };
            (key.to_string(), value)
        }
    });
    join_all(runs).await.into_iter().collect()
}

/// Status checker periodically probes servers over SSH
pub struct StatusChecker {
    store: Store,
    session: Arc<dyn RemoteSession>,
    interval_secs: u64,
    timeout: Duration,
    concurrency: usize,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl StatusChecker {
    /// `concurrency` caps how many servers are checked at once
    pub fn new(
        store: Store,
        session: Arc<dyn RemoteSession>,
        interval_secs: u64,
        timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            session,
            interval_secs,
            timeout,
            concurrency,
            stop_tx: None,
        }
    }

    /// Start the status checker
    pub fn start(&mut self) {
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        let store = self.store.clone();
        let session = self.session.clone();
        let interval_secs = self.interval_secs.max(1);
        let timeout = self.timeout;
        let concurrency = self.concurrency;

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = check_all_servers(&store, session.as_ref(), timeout, concurrency).await {
                            tracing::warn!("Error checking server status: {}", e);
                        }
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("Status checker stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Stop the status checker
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn check_all_servers(
    store: &Store,
    session: &dyn RemoteSession,
    timeout: Duration,
    concurrency: usize,
) -> anyhow::Result<()> {
    let servers = store.list_servers().await?;
    let probes: Vec<_> = servers
        .iter()
        .map(|server| async move {
            (server, probe_server(store, session, server, None, timeout).await)
        })
        .collect();
    let outcomes: Vec<_> = stream::iter(probes)
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await;

    for (server, outcome) in outcomes {
        match outcome {
            Ok(resp) if resp.status != "success" => {
                tracing::debug!("Server {} unreachable: {}", server.name, resp.message)
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Failed to update status for {}: {}", server.id, e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateServerRequest;
    use crate::ssh::testing::{Behaviour, ScriptedSession};
    use crate::ssh::{ConnectionParams, SessionResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn add(store: &Store, name: &str, ip: &str) -> Server {
        store
            .create_server(&CreateServerRequest {
                name: name.to_string(),
                hostname: name.to_string(),
                ip_address: ip.to_string(),
                port: 22,
                username: "root".to_string(),
                ssh_key_path: None,
                description: None,
                tags: vec![],
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_probe_records_status() {
        let store = Store::in_memory().await.unwrap();
        let up = add(&store, "up", "10.0.0.1").await;
        let down = add(&store, "down", "10.0.0.2").await;
        let session = ScriptedSession::new()
            .on("10.0.0.1", Behaviour::Output("SSH connection successful\n".into()))
            .on("10.0.0.2", Behaviour::Refuse("No route to host".into()));

        let ok = probe_server(&store, &session, &up, None, Duration::from_secs(5)).await.unwrap();
        assert_eq!(ok.status, "success");
        assert_eq!(ok.output.as_deref(), Some("SSH connection successful"));

        let bad = probe_server(&store, &session, &down, None, Duration::from_secs(5)).await.unwrap();
        assert_eq!(bad.status, "error");
        assert!(bad.message.contains("No route to host"));

        let up = store.get_server(up.id).await.unwrap().unwrap();
        let down = store.get_server(down.id).await.unwrap().unwrap();
        assert_eq!(up.status, server_status::ACTIVE);
        assert_eq!(down.status, server_status::ERROR);
        assert!(up.last_ping.is_some() && down.last_ping.is_some());
    }

    #[tokio::test]
    async fn test_gather_info_runs_every_command() {
        let store = Store::in_memory().await.unwrap();
        let server = add(&store, "box", "10.0.0.3").await;
        let session = ScriptedSession::new();

        let info = gather_server_info(&session, &server, None, Duration::from_secs(5)).await;

        assert_eq!(info.len(), INFO_COMMANDS.len());
        assert_eq!(info["cpu_info"], "ran on 10.0.0.3");
        let commands: Vec<String> = session.calls().into_iter().map(|c| c.1).collect();
        assert!(commands.contains(&"df -h /".to_string()));
    }

    #[tokio::test]
    async fn test_check_all_servers_probes_fleet() {
        let store = Store::in_memory().await.unwrap();
        add(&store, "a", "10.0.0.1").await;
        add(&store, "b", "10.0.0.2").await;
        let session = ScriptedSession::new().on("10.0.0.2", Behaviour::Exit(1, "denied".into()));

        check_all_servers(&store, &session, Duration::from_secs(5), 4).await.unwrap();

        let statuses: Vec<String> = store.list_servers().await.unwrap().into_iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![server_status::ACTIVE, server_status::ERROR]);
    }

    #[derive(Default)]
    struct GaugeSession {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteSession for GaugeSession {
        async fn connect_and_run(&self, _params: &ConnectionParams, _command: &str, _timeout: Duration) -> SessionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            SessionResult::from_exit(0, String::new(), String::new())
        }
    }

    #[tokio::test]
    async fn test_check_all_servers_is_bounded() {
        let store = Store::in_memory().await.unwrap();
        for i in 0..7 {
            add(&store, &format!("n{}", i), &format!("10.0.2.{}", i)).await;
        }
        let gauge = GaugeSession::default();

        check_all_servers(&store, &gauge, Duration::from_secs(5), 2).await.unwrap();

        assert_eq!(gauge.calls.load(Ordering::SeqCst), 7);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
        let servers = store.list_servers().await.unwrap();
        assert!(servers.iter().all(|s| s.status == server_status::ACTIVE));
    }
}
