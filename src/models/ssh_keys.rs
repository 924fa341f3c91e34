use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_ssh_port() -> u16 {
    22
}

fn default_test_timeout() -> u64 {
    10
}

/// SshKeyPair describes a generated key pair on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKeyPair {
    pub name: String,
    pub private_key_path: String,
    pub public_key_path: String,
    pub public_key_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateKeyRequest {
    #[serde(default)]
    pub key_name: String,
}

/// TestConnectionRequest for checking SSH reachability of an arbitrary host
#[derive(Debug, Clone, Deserialize)]
pub struct TestConnectionRequest {
    #[serde(default)]
    pub hostname: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_test_timeout")]
    pub timeout: u64,
}

/// CopyKeyRequest for appending a public key to a host's authorized_keys
#[derive(Debug, Clone, Deserialize)]
pub struct CopyKeyRequest {
    #[serde(default)]
    pub hostname: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub public_key_content: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// SetupSshRequest carries the one-off password used to bootstrap key auth
#[derive(Debug, Clone, Deserialize)]
pub struct SetupSshRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupSshResponse {
    pub message: String,
    pub private_key_path: String,
    pub public_key_path: String,
    pub connection_test: crate::ssh::SessionResult,
}
