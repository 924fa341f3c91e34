use std::env;

use crate::ssh::HostKeyPolicy;

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub listen_addr: String,
    pub ssh_keys_dir: String,
    pub known_hosts_path: String,
    pub host_key_policy: HostKeyPolicy,
    pub ssh_connect_timeout: u64,
    pub fanout_concurrency: usize,
    /// Seconds between fleet-wide status probes; 0 disables the checker
    pub status_interval: u64,
    pub playbook_mode: String,
    pub awx_host: String,
    pub awx_username: String,
    pub awx_password: String,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    /// An unrecognised host key policy is a startup error.
    pub fn load() -> anyhow::Result<Self> {
        let host_key_policy = parse_host_key_policy(&get_env("HOST_KEY_POLICY", "tofu"))?;
        Ok(Self {
            db_path: get_env("DB_PATH", "/data/fleet.db"),
            db_max_connections: get_env("DB_MAX_CONNECTIONS", "5")
                .parse()
                .unwrap_or(5),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8080"),
            ssh_keys_dir: get_env("SSH_KEYS_DIR", "/app/data/ssh_keys"),
            known_hosts_path: get_env("KNOWN_HOSTS_PATH", "/app/data/known_hosts"),
            host_key_policy,
            ssh_connect_timeout: get_env("SSH_CONNECT_TIMEOUT", "10")
                .parse()
                .unwrap_or(10),
            fanout_concurrency: get_env("FANOUT_CONCURRENCY", "20")
                .parse()
                .unwrap_or(20),
            status_interval: get_env("STATUS_INTERVAL", "0")
                .parse()
                .unwrap_or(0),
            playbook_mode: get_env("PLAYBOOK_MODE", "dry-run"),
            awx_host: get_env("AWX_HOST", ""),
            awx_username: get_env("AWX_USERNAME", "admin"),
            awx_password: get_env("AWX_PASSWORD", ""),
        })
    }

    /// Playbooks are delegated only when asked for and AWX is configured
    pub fn delegate_playbooks(&self) -> bool {
        self.playbook_mode.eq_ignore_ascii_case("delegate") && !self.awx_host.trim().is_empty()
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_host_key_policy(raw: &str) -> anyhow::Result<HostKeyPolicy> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("HOST_KEY_POLICY: {}", e))
}
