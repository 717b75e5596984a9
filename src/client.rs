use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::types::{EpisodeAck, ProgressAck, StepAck, StepId, WorkflowSnapshot};

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Extract the backend's `{"detail": ...}` message from an error body,
/// falling back to a generic message.
fn extract_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from))
        .unwrap_or_else(|| "Request failed".to_string())
}

/// Typed REST client for an analyst pipeline backend.
///
/// Covers the project-scoped workflow surface: snapshot reads, step
/// start/stop/complete/fail, progress reports, and per-episode control.
/// One client can serve any number of projects; the WebSocket event feed
/// is consumed separately (see [`crate::Synchronizer`]) from the URL
/// returned by [`WorkflowClient::ws_url`].
///
/// # Example
/// ```no_run
/// use workflow_sync::{StepId, WorkflowClient};
///
/// # async fn example() -> workflow_sync::Result<()> {
/// let client = WorkflowClient::new("http://127.0.0.1:8000/api/v2");
/// let snapshot = client.fetch_snapshot("my-project").await?;
/// if snapshot.step(StepId::ScriptAnalysis).dependencies.is_met {
///     client.start_step("my-project", StepId::ScriptAnalysis).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    http: Client,
    endpoint: String,
}

impl WorkflowClient {
    /// Create a new client pointing at the given API base endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: normalize(endpoint.into()),
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, timeouts, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn project_url(&self, project_id: &str, suffix: &str) -> String {
        format!("{}/projects/{}{}", self.endpoint, project_id, suffix)
    }

    /// The WebSocket URL carrying this project's event feed.
    pub fn ws_url(&self, project_id: &str) -> String {
        format!(
            "{}/projects/{}/ws",
            self.endpoint
                .replace("http://", "ws://")
                .replace("https://", "wss://"),
            project_id
        )
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let resp = request.send().await.map_err(|e| SyncError::Network {
            context: format!(
                "{} \u{2014} is the workflow backend at {} running?",
                context, self.endpoint
            ),
            source: e,
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Http {
                status,
                detail: extract_detail(&body),
            });
        }

        resp.json::<T>().await.map_err(|e| SyncError::Network {
            context: format!("Failed to parse {context} response"),
            source: e,
        })
    }

    // ── Snapshot ────────────────────────────────────────────────────

    /// Fetch the authoritative workflow snapshot for a project.
    pub async fn fetch_snapshot(&self, project_id: &str) -> Result<WorkflowSnapshot> {
        let url = self.project_url(project_id, "/workflow-state");
        self.execute(
            self.http.get(&url).timeout(SNAPSHOT_TIMEOUT),
            "Cannot fetch workflow state",
        )
        .await
    }

    // ── Step commands ───────────────────────────────────────────────

    /// Start a workflow step.
    pub async fn start_step(&self, project_id: &str, step: StepId) -> Result<StepAck> {
        let url = self.project_url(project_id, &format!("/workflow/{}/start", step.as_str()));
        self.execute(
            self.http.post(&url).timeout(COMMAND_TIMEOUT),
            "Cannot start step",
        )
        .await
    }

    /// Mark a step completed, optionally recording a quality score and a
    /// result artifact path.
    pub async fn complete_step(
        &self,
        project_id: &str,
        step: StepId,
        quality_score: Option<u32>,
        result_path: Option<&str>,
    ) -> Result<StepAck> {
        let url = self.project_url(project_id, &format!("/workflow/{}/complete", step.as_str()));
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(score) = quality_score {
            params.push(("quality_score", score.to_string()));
        }
        if let Some(path) = result_path {
            params.push(("result_path", path.to_string()));
        }
        self.execute(
            self.http.post(&url).query(&params).timeout(COMMAND_TIMEOUT),
            "Cannot complete step",
        )
        .await
    }

    /// Mark a step failed with an error message (also used for
    /// user-initiated cancellation).
    pub async fn fail_step(
        &self,
        project_id: &str,
        step: StepId,
        error_message: &str,
    ) -> Result<StepAck> {
        let url = self.project_url(project_id, &format!("/workflow/{}/fail", step.as_str()));
        self.execute(
            self.http
                .post(&url)
                .form(&[("error_message", error_message)])
                .timeout(COMMAND_TIMEOUT),
            "Cannot mark step failed",
        )
        .await
    }

    /// Report step progress, optionally with a current-task description.
    pub async fn update_progress(
        &self,
        project_id: &str,
        step: StepId,
        progress: f64,
        current_task: Option<&str>,
    ) -> Result<ProgressAck> {
        let url = self.project_url(project_id, &format!("/workflow/{}/progress", step.as_str()));
        let mut params: Vec<(&str, String)> = vec![("progress", progress.to_string())];
        if let Some(task) = current_task {
            params.push(("current_task", task.to_string()));
        }
        self.execute(
            self.http.post(&url).query(&params).timeout(COMMAND_TIMEOUT),
            "Cannot update progress",
        )
        .await
    }

    /// Stop a running workflow step.
    pub async fn stop_step(&self, project_id: &str, step: StepId) -> Result<StepAck> {
        let url = self.project_url(project_id, &format!("/workflow/{}/stop", step.as_str()));
        self.execute(
            self.http.post(&url).timeout(COMMAND_TIMEOUT),
            "Cannot stop step",
        )
        .await
    }

    // ── Episode commands ────────────────────────────────────────────

    /// Start processing a single episode within script analysis.
    pub async fn start_episode(&self, project_id: &str, episode_id: &str) -> Result<EpisodeAck> {
        let url = self.project_url(
            project_id,
            &format!("/workflow/step_2_script/episode/{episode_id}/start"),
        );
        self.execute(
            self.http.post(&url).timeout(COMMAND_TIMEOUT),
            "Cannot start episode",
        )
        .await
    }

    /// Stop processing a single episode within script analysis.
    pub async fn stop_episode(&self, project_id: &str, episode_id: &str) -> Result<EpisodeAck> {
        let url = self.project_url(
            project_id,
            &format!("/workflow/step_2_script/episode/{episode_id}/stop"),
        );
        self.execute(
            self.http.post(&url).timeout(COMMAND_TIMEOUT),
            "Cannot stop episode",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize("http://localhost:8000/api/v2/".into()),
            "http://localhost:8000/api/v2"
        );
        assert_eq!(
            normalize("http://localhost:8000/api/v2".into()),
            "http://localhost:8000/api/v2"
        );
        assert_eq!(normalize("http://host:8000///".into()), "http://host:8000");
    }

    #[test]
    fn test_project_urls() {
        let client = WorkflowClient::new("http://localhost:8000/api/v2/");
        assert_eq!(
            client.project_url("p1", "/workflow-state"),
            "http://localhost:8000/api/v2/projects/p1/workflow-state"
        );
        assert_eq!(
            client.project_url("p1", "/workflow/step_2_script/start"),
            "http://localhost:8000/api/v2/projects/p1/workflow/step_2_script/start"
        );
    }

    #[test]
    fn test_ws_url_scheme_rewrite() {
        let client = WorkflowClient::new("http://localhost:8000/api/v2");
        assert_eq!(
            client.ws_url("p1"),
            "ws://localhost:8000/api/v2/projects/p1/ws"
        );

        let tls = WorkflowClient::new("https://pipeline.example.com/api/v2");
        assert_eq!(
            tls.ws_url("p1"),
            "wss://pipeline.example.com/api/v2/projects/p1/ws"
        );
    }

    #[test]
    fn test_extract_detail() {
        assert_eq!(
            extract_detail(r#"{"detail": "Step dependencies not met"}"#),
            "Step dependencies not met"
        );
        // Absent detail falls back to a generic message
        assert_eq!(extract_detail(r#"{"error": "nope"}"#), "Request failed");
        assert_eq!(extract_detail("<html>502</html>"), "Request failed");
        assert_eq!(extract_detail(""), "Request failed");
    }
}
