//! Fan-out execution of commands and playbooks across a set of servers.
//!
//! A run creates its `running` record before any remote work, dispatches one
//! independent unit per resolved target, and always ends in a terminal record:
//! `completed` when dispatch ran to the end (even if every target failed) and
//! `failed` only when orchestration itself broke.

mod playbooks;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::models::*;
use crate::provisioning;
use crate::ssh::{ConnectionError, RemoteSession, SessionResult};
use crate::utils;

pub use playbooks::{merge_variables, Outcome, PlaybookLauncher};

pub const DEFAULT_CONCURRENCY: usize = 20;

/// Append/update interface for execution state transitions
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    async fn create_execution(&self, req: &CreateExecutionRequest) -> anyhow::Result<Execution>;
    async fn complete_execution(&self, id: &str, output: &Value) -> anyhow::Result<Execution>;
    async fn fail_execution(&self, id: &str, error: &str) -> anyhow::Result<Execution>;
}

/// Looks up servers by id. `Ok(None)` means the id is unknown.
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    async fn resolve_target(&self, id: i64) -> anyhow::Result<Option<Server>>;
}

/// Snapshot of what to run, taken at dispatch time
#[derive(Debug, Clone)]
pub enum Executable {
    Command(ShellCommand),
    Playbook(Playbook),
}

impl Executable {
    fn execution_type(&self) -> &'static str {
        match self {
            Executable::Command(_) => execution_type::COMMAND,
            Executable::Playbook(_) => execution_type::PLAYBOOK,
        }
    }

    fn name(&self) -> &str {
        match self {
            Executable::Command(c) => &c.name,
            Executable::Playbook(p) => &p.name,
        }
    }
}

/// Per-run knobs. The password is used for this run only and never stored.
#[derive(Clone, Default)]
pub struct RunParameters {
    pub extra_vars: Map<String, Value>,
    pub timeout_secs: Option<u64>,
    pub password: Option<String>,
}

pub struct RunRequest {
    pub executable: Executable,
    pub target_ids: Vec<i64>,
    pub params: RunParameters,
    pub actor: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("At least one target server is required")]
    NoTargets,
    #[error("Execution orchestration failed: {source:#}")]
    Orchestration {
        /// Set when the running record was created before the fault
        execution_id: Option<String>,
        #[source]
        source: anyhow::Error,
    },
}

/// A started run: the `running` record plus the dispatch task
pub struct ExecutionHandle {
    pub execution: Execution,
    records: Arc<dyn ExecutionLog>,
    join: JoinHandle<Result<Execution, RunError>>,
}

impl ExecutionHandle {
    /// Let the dispatch finish in the background and keep only the running record
    pub fn detach(self) -> Execution {
        self.execution
    }

    /// Wait for the run to reach its terminal record
    pub async fn wait(self) -> Result<Execution, RunError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                let id = self.execution.id;
                tracing::error!("Dispatch task for execution {} died: {}", id, e);
                if let Err(store_err) = self.records.fail_execution(&id, &format!("Dispatch task died: {}", e)).await {
                    tracing::error!("Could not mark execution {} failed: {:#}", id, store_err);
                }
                Err(RunError::Orchestration {
                    execution_id: Some(id),
                    source: anyhow!("dispatch task died: {}", e),
                })
            }
        }
    }
}

/// FanOutExecutor runs one executable against many servers concurrently
#[derive(Clone)]
pub struct FanOutExecutor {
    records: Arc<dyn ExecutionLog>,
    targets: Arc<dyn TargetRegistry>,
    session: Arc<dyn RemoteSession>,
    launcher: PlaybookLauncher,
    concurrency: usize,
}

impl FanOutExecutor {
    pub fn new(
        records: Arc<dyn ExecutionLog>,
        targets: Arc<dyn TargetRegistry>,
        session: Arc<dyn RemoteSession>,
    ) -> Self {
        Self {
            records,
            targets,
            session,
            launcher: PlaybookLauncher::DryRun,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_launcher(mut self, launcher: PlaybookLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Run to completion and return the terminal record
    pub async fn run(&self, req: RunRequest) -> Result<Execution, RunError> {
        self.start(req).await?.wait().await
    }

    /// Validate, persist the `running` record and dispatch in the background.
    pub async fn start(&self, req: RunRequest) -> Result<ExecutionHandle, RunError> {
        if req.target_ids.is_empty() {
            return Err(RunError::NoTargets);
        }

        let (command_id, playbook_id) = match &req.executable {
            Executable::Command(c) => (Some(c.id), None),
            Executable::Playbook(p) => (None, Some(p.id)),
        };
        let execution = self
            .records
            .create_execution(&CreateExecutionRequest {
                execution_type: req.executable.execution_type().to_string(),
                target_servers: req.target_ids.clone(),
                command_id,
                playbook_id,
                executed_by: req.actor.clone(),
            })
            .await
            .map_err(|e| {
                tracing::error!("Could not create execution record: {:#}", e);
                RunError::Orchestration {
                    execution_id: None,
                    source: e,
                }
            })?;

        tracing::info!(
            "Execution {} started: {} '{}' on {} target(s) by {}",
            execution.id,
            req.executable.execution_type(),
            req.executable.name(),
            req.target_ids.len(),
            req.actor
        );

        let this = self.clone();
        let id = execution.id.clone();
        let join = tokio::spawn(async move { this.dispatch(id, req).await });

        Ok(ExecutionHandle {
            execution,
            records: self.records.clone(),
            join,
        })
    }

    async fn dispatch(&self, id: String, req: RunRequest) -> Result<Execution, RunError> {
        let outcome = match &req.executable {
            Executable::Command(command) => self.run_command(command, &req).await.map(Outcome::Completed),
            Executable::Playbook(playbook) => self.run_playbook(playbook, &req).await,
        };

        let finished = match outcome {
            Ok(Outcome::Completed(output)) => self.records.complete_execution(&id, &output).await,
            Ok(Outcome::Rejected(message)) => self.records.fail_execution(&id, &message).await,
            Err(fault) => return Err(self.abort(&id, fault).await),
        };

        match finished {
            Ok(execution) => {
                let results = execution.target_results();
                if results.is_empty() {
                    tracing::info!("Execution {} finished: {}", execution.id, execution.status);
                } else {
                    let ok = results.iter().filter(|r| r.status == target_status::SUCCESS).count();
                    tracing::info!(
                        "Execution {} finished: {} ({}/{} targets succeeded)",
                        execution.id,
                        execution.status,
                        ok,
                        results.len()
                    );
                }
                Ok(execution)
            }
            Err(e) => Err(self.abort(&id, e).await),
        }
    }

    /// Best-effort transition to `failed` after an orchestration fault
    async fn abort(&self, id: &str, fault: anyhow::Error) -> RunError {
        tracing::error!("Execution {} orchestration fault: {:#}", id, fault);
        if let Err(e) = self.records.fail_execution(id, &format!("{:#}", fault)).await {
            tracing::error!("Could not mark execution {} failed: {:#}", id, e);
        }
        RunError::Orchestration {
            execution_id: Some(id.to_string()),
            source: fault,
        }
    }

    /// Resolve ids in order, skipping unknown ids and repeats
    async fn resolve_targets(&self, ids: &[i64]) -> anyhow::Result<Vec<Server>> {
        let mut seen = HashSet::new();
        let mut servers = Vec::with_capacity(ids.len());
        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.targets.resolve_target(id).await? {
                Some(server) => servers.push(server),
                None => tracing::debug!("Skipping unknown server {}", id),
            }
        }
        Ok(servers)
    }

    async fn run_command(&self, command: &ShellCommand, req: &RunRequest) -> anyhow::Result<Value> {
        let servers = self.resolve_targets(&req.target_ids).await?;
        let timeout = Duration::from_secs(
            req.params
                .timeout_secs
                .unwrap_or_else(|| u64::try_from(command.timeout).unwrap_or(0))
                .max(1),
        );

        // buffered() keeps input order and caps how many units are in flight
        let results: Vec<TargetResult> = stream::iter(servers.into_iter().map(|server| {
            let server_id = server.id;
            let server_name = server.name.clone();
            let unit = tokio::spawn(run_on_target(
                self.session.clone(),
                server,
                command.command.clone(),
                req.params.password.clone(),
                timeout,
            ));
            async move {
                match unit.await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!("Unit for server {} ({}) aborted: {}", server_id, server_name, e);
                        target_result(server_id, server_name, SessionResult::failed(format!("Internal error: {}", e)))
                    }
                }
            }
        }))
        .buffered(self.concurrency)
        .collect()
        .await;

        Ok(serde_json::to_value(results)?)
    }

    async fn run_playbook(&self, playbook: &Playbook, req: &RunRequest) -> anyhow::Result<Outcome> {
        let servers = self.resolve_targets(&req.target_ids).await?;
        let vars = merge_variables(&playbook.variables, &req.params.extra_vars);
        Ok(self.launcher.launch(playbook, &servers, vars).await)
    }
}

/// One target's unit of work. Never fails; every problem becomes an error entry.
async fn run_on_target(
    session: Arc<dyn RemoteSession>,
    server: Server,
    command: String,
    password: Option<String>,
    timeout: Duration,
) -> TargetResult {
    let params = provisioning::connection_params(&server, password.as_deref());
    let result = match tokio::time::timeout(timeout, session.connect_and_run(&params, &command, timeout)).await {
        Ok(result) => result,
        Err(_) => SessionResult::failed(ConnectionError::Timeout(timeout.as_secs())),
    };
    if result.exit_code != 0 {
        tracing::warn!(
            "Server {} ({}) failed with exit code {}: {}",
            server.id,
            server.name,
            result.exit_code,
            utils::truncate_lines(result.error.trim(), 5)
        );
    }
    target_result(server.id, server.name, result)
}

fn target_result(server_id: i64, server_name: String, result: SessionResult) -> TargetResult {
    TargetResult {
        server_id,
        server_name,
        status: if result.exit_code == 0 {
            target_status::SUCCESS.to_string()
        } else {
            target_status::ERROR.to_string()
        },
        exit_code: result.exit_code,
        output: result.output,
        error: result.error,
    }
}
