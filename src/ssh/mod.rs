mod client;
mod host_keys;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use client::Ssh2Client;
pub use host_keys::{HostKeyPolicy, HostKeyVerifier};

/// Command used for reachability checks
pub const TEST_COMMAND: &str = "echo \"SSH connection successful\"";

/// Credential used to authenticate one SSH session.
/// Build it with [`Credential::resolve`] so every call site applies the same order.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    KeyFile(PathBuf),
    Password(String),
    None,
}

impl Credential {
    /// Pick the credential for a call: an existing key file wins, then a
    /// non-empty password, otherwise an unauthenticated/default attempt.
    pub fn resolve(key_file: Option<&str>, password: Option<&str>) -> Self {
        if let Some(path) = key_file.filter(|p| !p.trim().is_empty()) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Credential::KeyFile(path);
            }
            tracing::debug!("Key file {} does not exist, ignoring", path.display());
        }
        match password.filter(|p| !p.is_empty()) {
            Some(p) => Credential::Password(p.to_string()),
            None => Credential::None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::KeyFile(_) => "key_file",
            Credential::Password(_) => "password",
            Credential::None => "none",
        }
    }
}

// Never print the password.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            Credential::Password(_) => f.write_str("Password(***)"),
            Credential::None => f.write_str("None"),
        }
    }
}

/// Everything needed to open a session to one host
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
}

/// Outcome of one remote command. Failures to connect, authenticate or finish
/// within the timeout are folded in with `exit_code = -1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub success: bool,
    pub exit_code: i32,
    pub output: String,
    pub error: String,
}

impl SessionResult {
    pub fn from_exit(exit_code: i32, output: String, error: String) -> Self {
        Self {
            success: exit_code == 0,
            exit_code,
            output,
            error,
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            exit_code: -1,
            output: String::new(),
            error: error.to_string(),
        }
    }
}

/// Reasons a session could not run its command
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Invalid address {0}")]
    Address(String),
    #[error("TCP connection failed: {0}")]
    Tcp(#[from] std::io::Error),
    #[error("SSH handshake failed: {0}")]
    Handshake(String),
    #[error("Host key rejected for {host}: {reason}")]
    HostKey { host: String, reason: String },
    #[error("SSH authentication failed: {0}")]
    Auth(String),
    #[error("Command execution failed: {0}")]
    Exec(String),
    #[error("Timed out after {0}s")]
    Timeout(u64),
}

/// Remote Session Client: one independent session per call, one command per session.
/// Implementations never fail past this boundary; every problem lands in the result.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn connect_and_run(
        &self,
        params: &ConnectionParams,
        command: &str,
        timeout: Duration,
    ) -> SessionResult;

    async fn test_connection(&self, params: &ConnectionParams, timeout: Duration) -> SessionResult {
        self.connect_and_run(params, TEST_COMMAND, timeout).await
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// How the scripted session answers for a given host
    #[derive(Debug, Clone)]
    pub enum Behaviour {
        Output(String),
        Exit(i32, String),
        Refuse(String),
        Hang(Duration),
        Panic,
    }

    /// In-memory RemoteSession keyed by host name
    #[derive(Default)]
    pub struct ScriptedSession {
        behaviours: HashMap<String, Behaviour>,
        calls: Mutex<Vec<(String, String, Credential)>>,
    }

    impl ScriptedSession {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(mut self, host: &str, behaviour: Behaviour) -> Self {
            self.behaviours.insert(host.to_string(), behaviour);
            self
        }

        /// (host, command, credential) for every call made so far
        pub fn calls(&self) -> Vec<(String, String, Credential)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteSession for ScriptedSession {
        async fn connect_and_run(
            &self,
            params: &ConnectionParams,
            command: &str,
            _timeout: Duration,
        ) -> SessionResult {
            self.calls.lock().unwrap().push((
                params.host.clone(),
                command.to_string(),
                params.credential.clone(),
            ));
            let behaviour = self
                .behaviours
                .get(&params.host)
                .cloned()
                .unwrap_or_else(|| Behaviour::Output(format!("ran on {}", params.host)));
            match behaviour {
                Behaviour::Output(out) => SessionResult::from_exit(0, out, String::new()),
                Behaviour::Exit(code, err) => SessionResult::from_exit(code, String::new(), err),
                Behaviour::Refuse(err) => SessionResult::failed(err),
                Behaviour::Hang(d) => {
                    tokio::time::sleep(d).await;
                    SessionResult::from_exit(0, "late".to_string(), String::new())
                }
                Behaviour::Panic => panic!("scripted panic for {}", params.host),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_existing_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_test");
        std::fs::write(&key, "key").unwrap();

        let cred = Credential::resolve(key.to_str(), Some("secret"));
        assert_eq!(cred, Credential::KeyFile(key));
    }

    #[test]
    fn test_resolve_missing_key_falls_back_to_password() {
        let cred = Credential::resolve(Some("/nonexistent/fleet/key"), Some("secret"));
        assert_eq!(cred, Credential::Password("secret".to_string()));
    }

    #[test]
    fn test_resolve_nothing_is_none() {
        assert_eq!(Credential::resolve(None, None), Credential::None);
        assert_eq!(Credential::resolve(Some(""), Some("")), Credential::None);
    }

    #[test]
    fn test_credential_debug_hides_password() {
        let printed = format!("{:?}", Credential::Password("hunter2".to_string()));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_session_result_shapes() {
        let ok = SessionResult::from_exit(0, "hi".into(), String::new());
        assert!(ok.success);
        let nonzero = SessionResult::from_exit(2, String::new(), "boom".into());
        assert!(!nonzero.success);
        assert_eq!(nonzero.exit_code, 2);
        let failed = SessionResult::failed(ConnectionError::Timeout(5));
        assert_eq!(failed.exit_code, -1);
        assert_eq!(failed.error, "Timed out after 5s");
    }
}
