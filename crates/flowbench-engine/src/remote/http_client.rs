// HTTP implementation of the remote job service client.
//
// Wire shapes: job submission posts the run metadata and expanded steps,
// the state endpoint returns the flat run record, files stream back as raw
// bytes.

use crate::remote::RemoteClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use flowbench_common::{ExecutedStep, Run, RunRecord, RunState};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize)]
struct CreateJobRequest<'a> {
    #[serde(rename = "displayName")]
    display_name: &'a str,
    #[serde(rename = "groupName")]
    group: &'a str,
    steps: &'a [ExecutedStep],
    #[serde(rename = "outputFiles")]
    output_files: &'a [String],
}

#[derive(Deserialize)]
struct CreateJobResponse {
    #[serde(rename = "jobId")]
    job_id: String,
}

/// Talks to the remote job service over HTTP.
pub struct HttpRemoteClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn jobs_url(&self) -> String {
        format!("{}/jobs", self.base_url)
    }

    fn job_url(&self, remote_id: &str) -> String {
        format!("{}/jobs/{}", self.base_url, remote_id)
    }

    fn state_url(&self, remote_id: &str) -> String {
        format!("{}/state", self.job_url(remote_id))
    }

    fn file_url(&self, remote_id: &str, remote_path: &str) -> String {
        format!("{}/files/{}", self.job_url(remote_id), remote_path)
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn create_remote_job(
        &self,
        run: &Run,
        steps: &[ExecutedStep],
        output_files: &[String],
    ) -> Result<String> {
        let request = CreateJobRequest {
            display_name: &run.display_name,
            group: &run.group,
            steps,
            output_files,
        };

        let response = self
            .client
            .post(self.jobs_url())
            .json(&request)
            .send()
            .await
            .context("submitting job to remote service")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("remote service rejected job submission: HTTP {status}");
        }

        let body: CreateJobResponse = response
            .json()
            .await
            .context("reading job submission response")?;
        Ok(body.job_id)
    }

    async fn poll_state(&self, remote_id: &str, _last_known: &RunState) -> Result<RunState> {
        let response = self
            .client
            .get(self.state_url(remote_id))
            .send()
            .await
            .with_context(|| format!("polling state of remote job '{remote_id}'"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("state poll for remote job '{remote_id}' returned HTTP {status}");
        }

        let record: RunRecord = response
            .json()
            .await
            .with_context(|| format!("reading state of remote job '{remote_id}'"))?;
        let state = record
            .try_into()
            .with_context(|| format!("remote job '{remote_id}' sent a malformed state record"))?;
        Ok(state)
    }

    async fn stop_remote_job(&self, remote_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.job_url(remote_id))
            .send()
            .await
            .with_context(|| format!("stopping remote job '{remote_id}'"))?;

        let status = response.status();
        // The job may already be gone; that is the desired end state.
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!("stop of remote job '{remote_id}' returned HTTP {status}");
        }
        Ok(())
    }

    async fn download_file(
        &self,
        remote_id: &str,
        remote_path: &str,
        destination: &Path,
    ) -> Result<()> {
        let response = self
            .client
            .get(self.file_url(remote_id, remote_path))
            .send()
            .await
            .with_context(|| format!("requesting '{remote_path}' of remote job '{remote_id}'"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("download of '{remote_path}' returned HTTP {status}");
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("reading '{remote_path}' of remote job '{remote_id}'"))?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        tokio::fs::write(destination, &bytes)
            .await
            .with_context(|| format!("writing {}", destination.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_a_normalized_base() {
        let client = HttpRemoteClient::new("http://jobs.internal:8080/");
        assert_eq!(client.jobs_url(), "http://jobs.internal:8080/jobs");
        assert_eq!(client.job_url("j-17"), "http://jobs.internal:8080/jobs/j-17");
        assert_eq!(
            client.state_url("j-17"),
            "http://jobs.internal:8080/jobs/j-17/state"
        );
        assert_eq!(
            client.file_url("j-17", "results/metrics.json"),
            "http://jobs.internal:8080/jobs/j-17/files/results/metrics.json"
        );
    }

    #[test]
    fn job_request_wire_names() {
        let request = CreateJobRequest {
            display_name: "bench run",
            group: "group-a",
            steps: &[],
            output_files: &[],
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"displayName\""));
        assert!(json.contains("\"groupName\""));
        assert!(json.contains("\"outputFiles\""));
    }
}
