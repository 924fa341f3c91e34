mod keystore;

use std::time::Duration;

use crate::db::Store;
use crate::models::{Server, SetupSshResponse};
use crate::ssh::{ConnectionParams, Credential, RemoteSession, SessionResult};
use crate::utils;

pub use keystore::KeyStore;

/// Errors from key generation and key installation
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Invalid key name '{0}': only letters, digits, '.', '_' and '-' are allowed")]
    InvalidKeyName(String),
    #[error("Key '{0}' already exists")]
    KeyExists(String),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Failed to install public key: {0}")]
    InstallFailed(String),
    #[error("Key encoding failed: {0}")]
    Encoding(#[from] ssh_key::Error),
    #[error("Key file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Credential for a registered server. The stored key path wins when the file
/// exists; a per-call password is the fallback and is never persisted.
pub fn resolve_credential(server: &Server, password: Option<&str>) -> Credential {
    Credential::resolve(server.ssh_key_path.as_deref(), password)
}

/// Connection parameters for a registered server
pub fn connection_params(server: &Server, password: Option<&str>) -> ConnectionParams {
    let host = if server.ip_address.trim().is_empty() {
        server.hostname.clone()
    } else {
        server.ip_address.clone()
    };
    ConnectionParams {
        host,
        port: u16::try_from(server.port).unwrap_or(22),
        username: server.username.clone(),
        credential: resolve_credential(server, password),
    }
}

/// Shell command that appends `public_key` to the remote authorized_keys once.
/// The key must be a single OpenSSH public key line; it is re-encoded before use.
pub fn install_key_command(public_key: &str) -> Result<String, ProvisionError> {
    let line = public_key.trim();
    if line.is_empty() || line.contains(['\n', '\r']) {
        return Err(ProvisionError::InvalidPublicKey(
            "expected a single public key line".to_string(),
        ));
    }
    let parsed = ssh_key::PublicKey::from_openssh(line)
        .map_err(|e| ProvisionError::InvalidPublicKey(e.to_string()))?;
    let normalized = parsed
        .to_openssh()
        .map_err(|e| ProvisionError::InvalidPublicKey(e.to_string()))?;
    let key = utils::shell_quote(&normalized);
    Ok(format!(
        "mkdir -p ~/.ssh && chmod 700 ~/.ssh && touch ~/.ssh/authorized_keys && \
         (grep -qxF {key} ~/.ssh/authorized_keys || echo {key} >> ~/.ssh/authorized_keys) && \
         chmod 600 ~/.ssh/authorized_keys",
        key = key
    ))
}

/// Append a public key to the target's authorized_keys with one remote command.
pub async fn install_public_key(
    session: &dyn RemoteSession,
    params: &ConnectionParams,
    public_key: &str,
    timeout: Duration,
) -> Result<SessionResult, ProvisionError> {
    let command = install_key_command(public_key)?;
    let result = session.connect_and_run(params, &command, timeout).await;
    if result.success {
        tracing::info!("Installed public key on {}@{}", params.username, params.host);
    } else {
        tracing::warn!(
            "Installing public key on {}@{} failed: {}",
            params.username,
            params.host,
            result.error
        );
    }
    Ok(result)
}

/// Bootstrap key authentication for a server: generate (or reuse) its key pair,
/// install the public key using a one-off password, record the key path, then
/// verify a key-only connection.
pub async fn setup_key_auth(
    store: &Store,
    keys: &KeyStore,
    session: &dyn RemoteSession,
    server: &Server,
    password: &str,
    timeout: Duration,
) -> Result<SetupSshResponse, ProvisionError> {
    let name = format!("server_{}_{}", server.id, utils::sanitize_key_name(&server.name));
    let pair = match keys.get(&name)? {
        Some(existing) => existing,
        None => keys.generate_key_pair(&name)?,
    };

    let mut params = connection_params(server, None);
    params.credential = Credential::Password(password.to_string());
    let installed = install_public_key(session, &params, &pair.public_key_content, timeout).await?;
    if !installed.success {
        return Err(ProvisionError::InstallFailed(installed.error));
    }

    store.set_server_key_path(server.id, &pair.private_key_path).await?;

    params.credential = Credential::resolve(Some(&pair.private_key_path), None);
    let connection_test = session.test_connection(&params, timeout).await;

    Ok(SetupSshResponse {
        message: format!("SSH key authentication set up for {}", server.name),
        private_key_path: pair.private_key_path,
        public_key_path: pair.public_key_path,
        connection_test,
    })
}
