use serde_json::{json, Map, Value};

use crate::awx::AwxClient;
use crate::models::{Playbook, Server};

/// Terminal outcome of a dispatch that did not hit an orchestration fault
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Value),
    /// The run was refused downstream; the record is marked failed with this message
    Rejected(String),
}

/// How playbook runs are carried out
#[derive(Clone)]
pub enum PlaybookLauncher {
    /// Record what would run without contacting anything
    DryRun,
    /// Launch the AWX job template named after the playbook
    Delegate(AwxClient),
}

impl PlaybookLauncher {
    pub fn mode(&self) -> &'static str {
        match self {
            PlaybookLauncher::DryRun => "dry-run",
            PlaybookLauncher::Delegate(_) => "delegate",
        }
    }

    pub async fn launch(&self, playbook: &Playbook, targets: &[Server], extra_vars: Map<String, Value>) -> Outcome {
        let target_list: Vec<Value> = targets
            .iter()
            .map(|s| json!({ "server_id": s.id, "server_name": s.name }))
            .collect();

        if targets.is_empty() {
            return Outcome::Completed(json!({
                "mode": self.mode(),
                "playbook": playbook.name,
                "version": playbook.version,
                "targets": target_list,
                "message": "No known target servers; nothing launched",
            }));
        }

        match self {
            PlaybookLauncher::DryRun => Outcome::Completed(json!({
                "mode": self.mode(),
                "playbook": playbook.name,
                "version": playbook.version,
                "targets": target_list,
                "extra_vars": extra_vars,
                "message": format!(
                    "Playbook '{}' v{} would run on {} target(s)",
                    playbook.name,
                    playbook.version,
                    targets.len()
                ),
            })),
            PlaybookLauncher::Delegate(client) => {
                let hosts: Vec<String> = targets.iter().map(|s| s.name.clone()).collect();
                match client.launch_playbook(&playbook.name, &hosts, &extra_vars).await {
                    Ok(job) => Outcome::Completed(json!({
                        "mode": self.mode(),
                        "playbook": playbook.name,
                        "version": playbook.version,
                        "targets": target_list,
                        "external_job_id": job.id,
                        "job_template_id": job.job_template_id,
                        "external_status": job.status,
                    })),
                    Err(e) => {
                        tracing::warn!("Delegate launch of playbook '{}' failed: {:#}", playbook.name, e);
                        Outcome::Rejected(format!("Orchestration delegate error: {:#}", e))
                    }
                }
            }
        }
    }
}

/// Playbook defaults overlaid with per-run variables
pub fn merge_variables(defaults: &Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = defaults.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_variables_overrides_win() {
        let defaults = json!({"env": "prod", "retries": 3}).as_object().cloned().unwrap();
        let overrides = json!({"retries": 5, "dry": true}).as_object().cloned().unwrap();

        let merged = merge_variables(&defaults, &overrides);
        assert_eq!(Value::Object(merged), json!({"env": "prod", "retries": 5, "dry": true}));
    }
}
