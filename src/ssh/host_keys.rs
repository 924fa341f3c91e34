use ssh2::{CheckResult, KnownHostFileKind};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use super::ConnectionError;

/// How unknown or changed host keys are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Record unseen hosts, reject hosts whose key changed
    TrustOnFirstUse,
    /// Only hosts already in known_hosts with a matching key are accepted
    StrictKnownHosts,
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tofu" | "trust-on-first-use" | "accept-new" => Ok(Self::TrustOnFirstUse),
            "strict" | "strict-known-hosts" => Ok(Self::StrictKnownHosts),
            other => Err(format!("unknown host key policy '{}'", other)),
        }
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrustOnFirstUse => f.write_str("tofu"),
            Self::StrictKnownHosts => f.write_str("strict"),
        }
    }
}

/// Name a host is stored under in an OpenSSH known_hosts file
pub fn known_hosts_entry(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{}]:{}", host, port)
    }
}

/// Checks server host keys against a known_hosts file according to a policy.
pub struct HostKeyVerifier {
    policy: HostKeyPolicy,
    known_hosts_path: PathBuf,
    // Serializes read-modify-write of the known_hosts file within this process
    file_lock: Mutex<()>,
}

impl HostKeyVerifier {
    pub fn new(policy: HostKeyPolicy, known_hosts_path: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            known_hosts_path: known_hosts_path.into(),
            file_lock: Mutex::new(()),
        }
    }

    /// Verify the key presented during the handshake of `session`.
    pub fn verify(&self, session: &ssh2::Session, host: &str, port: u16) -> Result<(), ConnectionError> {
        let (key, key_type) = session.host_key().ok_or_else(|| ConnectionError::HostKey {
            host: known_hosts_entry(host, port),
            reason: "server presented no host key".to_string(),
        })?;
        self.check_key(host, port, key, key_type)
    }

    /// Decide on a raw host key blob against the known_hosts file, recording it
    /// when the policy trusts first use.
    pub fn check_key(
        &self,
        host: &str,
        port: u16,
        key: &[u8],
        key_type: ssh2::HostKeyType,
    ) -> Result<(), ConnectionError> {
        let entry = known_hosts_entry(host, port);
        let reject = |reason: &str| ConnectionError::HostKey {
            host: entry.clone(),
            reason: reason.to_string(),
        };

        let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());

        // A bare session is enough to drive libssh2's known_hosts parser
        let session = ssh2::Session::new()
            .map_err(|e| reject(&format!("cannot initialise known hosts: {}", e)))?;
        let mut known = session
            .known_hosts()
            .map_err(|e| reject(&format!("cannot initialise known hosts: {}", e)))?;
        if self.known_hosts_path.exists() {
            known
                .read_file(&self.known_hosts_path, KnownHostFileKind::OpenSSH)
                .map_err(|e| {
                    reject(&format!(
                        "cannot read {}: {}",
                        self.known_hosts_path.display(),
                        e
                    ))
                })?;
        }

        match known.check_port(host, port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::Mismatch => {
                tracing::warn!("Host key for {} does not match known_hosts", entry);
                Err(reject("host key changed since it was first recorded"))
            }
            CheckResult::Failure => Err(reject("known_hosts lookup failed")),
            CheckResult::NotFound => match self.policy {
                HostKeyPolicy::StrictKnownHosts => Err(reject("host is not in known_hosts")),
                HostKeyPolicy::TrustOnFirstUse => {
                    known
                        .add(&entry, key, "fleet-runner", key_type.into())
                        .map_err(|e| reject(&format!("cannot record host key: {}", e)))?;
                    if let Some(parent) = self.known_hosts_path.parent() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            reject(&format!("cannot create {}: {}", parent.display(), e))
                        })?;
                    }
                    known
                        .write_file(&self.known_hosts_path, KnownHostFileKind::OpenSSH)
                        .map_err(|e| {
                            reject(&format!(
                                "cannot write {}: {}",
                                self.known_hosts_path.display(),
                                e
                            ))
                        })?;
                    tracing::info!("Recorded new host key for {}", entry);
                    Ok(())
                }
            },
        }
    }
}
