mod awx;
mod config;
mod db;
mod executor;
mod handlers;
mod models;
mod provisioning;
mod router;
mod ssh;
mod status;
mod utils;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use awx::AwxClient;
use config::Config;
use db::Store;
use executor::{FanOutExecutor, PlaybookLauncher};
use provisioning::KeyStore;
use ssh::{HostKeyVerifier, RemoteSession, Ssh2Client};
use status::StatusChecker;

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub executor: FanOutExecutor,
    pub keys: KeyStore,
    pub session: Arc<dyn RemoteSession>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleet_runner=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::load()?;
    tracing::info!("Starting FleetRunner Server");
    tracing::info!("Database: {}", cfg.db_path);
    tracing::info!("SSH keys: {}", cfg.ssh_keys_dir);
    tracing::info!("Host key policy: {} ({})", cfg.host_key_policy, cfg.known_hosts_path);
    tracing::info!("Listen: {}", cfg.listen_addr);

    let store = Store::with_pool_size(&cfg.db_path, cfg.db_max_connections).await?;
    tracing::info!("Database initialized (pool_size={})", cfg.db_max_connections);

    // Runs cut short by a previous shutdown stay `running`; surface them
    match store.list_running_executions().await {
        Ok(stale) if !stale.is_empty() => {
            let ids: Vec<&str> = stale.iter().map(|e| e.id.as_str()).collect();
            tracing::warn!(
                "{} execution(s) still marked running from a previous run: {}",
                stale.len(),
                ids.join(", ")
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Could not list running executions: {}", e),
    }

    let session: Arc<dyn RemoteSession> = Arc::new(Ssh2Client::new(
        HostKeyVerifier::new(cfg.host_key_policy, cfg.known_hosts_path.clone()),
        Duration::from_secs(cfg.ssh_connect_timeout),
    ));

    let launcher = if cfg.delegate_playbooks() {
        match AwxClient::new(&cfg.awx_host, &cfg.awx_username, &cfg.awx_password) {
            Ok(client) => {
                if client.test_connection().await {
                    tracing::info!("Playbooks delegated to AWX at {}", client.base_url());
                } else {
                    tracing::warn!("AWX at {} is not answering yet; launches will fail until it does", client.base_url());
                }
                PlaybookLauncher::Delegate(client)
            }
            Err(e) => {
                tracing::warn!("AWX client unavailable ({}); playbooks run in dry-run mode", e);
                PlaybookLauncher::DryRun
            }
        }
    } else {
        PlaybookLauncher::DryRun
    };

    let executor = FanOutExecutor::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        session.clone(),
    )
    .with_concurrency(cfg.fanout_concurrency)
    .with_launcher(launcher);

    let mut status_checker = StatusChecker::new(
        store.clone(),
        session.clone(),
        cfg.status_interval,
        Duration::from_secs(cfg.ssh_connect_timeout),
        cfg.fanout_concurrency,
    );
    if cfg.status_interval > 0 {
        status_checker.start();
        tracing::info!("Status checker running every {}s", cfg.status_interval);
    }

    let state = Arc::new(AppState {
        store,
        config: cfg.clone(),
        executor,
        keys: KeyStore::new(&cfg.ssh_keys_dir),
        session,
    });

    let app = router::build(state);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!("FleetRunner listening on {}", cfg.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    status_checker.stop();
    tracing::info!("FleetRunner shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
