use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;

use super::types::*;

/// AWX (Ansible Tower) REST client used as the playbook orchestration delegate
#[derive(Clone)]
pub struct AwxClient {
    base_url: String,
    username: String,
    password: String,
    client: Client,
}

impl AwxClient {
    pub fn new(url: &str, username: &str, password: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        let url = url.trim().trim_end_matches('/');
        let base_url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("http://{}", url)
        };

        Ok(Self {
            base_url,
            username: username.to_string(),
            password: password.to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v2{}", self.base_url, path)
    }

    /// Test connectivity to AWX
    pub async fn test_connection(&self) -> bool {
        match self
            .client
            .get(self.api_url("/ping/"))
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Look up a job template by its exact name
    pub async fn find_job_template(&self, name: &str) -> Result<Option<JobTemplate>> {
        let resp = self
            .client
            .get(self.api_url("/job_templates/"))
            .query(&[("name", name)])
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await
            .context("AWX request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("AWX API error {}: {}", status, body));
        }

        let page: PaginatedResponse<JobTemplate> = resp.json().await?;
        Ok(page.results.into_iter().find(|t| t.name == name))
    }

    pub async fn launch_job_template(&self, template_id: i64, launch: &LaunchRequest) -> Result<LaunchedJob> {
        let resp = self
            .client
            .post(self.api_url(&format!("/job_templates/{}/launch/", template_id)))
            .basic_auth(&self.username, Some(&self.password))
            .json(launch)
            .send()
            .await
            .context("AWX request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("AWX launch rejected {}: {}", status, body));
        }

        let mut job: LaunchedJob = resp.json().await?;
        job.job_template_id.get_or_insert(template_id);
        Ok(job)
    }

    /// Launch the job template named after a playbook, limited to `hosts`
    pub async fn launch_playbook(
        &self,
        playbook_name: &str,
        hosts: &[String],
        extra_vars: &Map<String, Value>,
    ) -> Result<LaunchedJob> {
        let template = self
            .find_job_template(playbook_name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No AWX job template named '{}'", playbook_name))?;

        let job = self
            .launch_job_template(
                template.id,
                &LaunchRequest {
                    extra_vars: extra_vars.clone(),
                    limit: hosts.join(","),
                },
            )
            .await?;
        tracing::info!(
            "AWX job {} launched from template {} ({}) for {} host(s)",
            job.id,
            template.id,
            template.name,
            hosts.len()
        );
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let c = AwxClient::new("awx_web:8052/", "admin", "pw").unwrap();
        assert_eq!(c.base_url(), "http://awx_web:8052");
        assert_eq!(c.api_url("/ping/"), "http://awx_web:8052/api/v2/ping/");

        let c = AwxClient::new("https://tower.example.com", "admin", "pw").unwrap();
        assert_eq!(c.base_url(), "https://tower.example.com");
    }

    #[tokio::test]
    async fn test_unreachable_delegate_errors() {
        // Port 9 on localhost: nothing listens there in CI
        let c = AwxClient::new("http://127.0.0.1:9", "admin", "pw").unwrap();
        assert!(!c.test_connection().await);
        assert!(c.launch_playbook("site", &["web".to_string()], &Map::new()).await.is_err());
    }
}
