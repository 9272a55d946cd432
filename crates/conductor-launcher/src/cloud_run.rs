//! Cloud Run Jobs launcher.

use std::time::Duration;

use async_trait::async_trait;
use conductor_core::{LaunchError, LaunchSpec, Launcher};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::worker_env;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// The run call only acknowledges the enqueue; the worker itself runs for
/// tens of minutes and reports back through the event callback.
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Launcher backed by the Cloud Run Jobs v2 API.
///
/// Each launch triggers one execution of a pre-deployed worker job with
/// per-job container environment overrides. Authentication uses the
/// ambient service account token from the GCE metadata server.
pub struct CloudRunLauncher {
    client: reqwest::Client,
    project: String,
    region: String,
    job_name: String,
    orchestrator_url: String,
    webhook_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl CloudRunLauncher {
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        job_name: impl Into<String>,
        orchestrator_url: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            project: project.into(),
            region: region.into(),
            job_name: job_name.into(),
            orchestrator_url: orchestrator_url.into(),
            webhook_secret: webhook_secret.into(),
        }
    }

    fn run_url(&self) -> String {
        format!(
            "https://{region}-run.googleapis.com/v2/projects/{project}/locations/{region}/jobs/{job}:run",
            region = self.region,
            project = self.project,
            job = self.job_name,
        )
    }

    async fn metadata_token(&self) -> Result<String, LaunchError> {
        let response = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| LaunchError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LaunchError::Auth(format!(
                "metadata server returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| LaunchError::Auth(e.to_string()))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl Launcher for CloudRunLauncher {
    fn name(&self) -> &'static str {
        "cloud-run"
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<String, LaunchError> {
        let token = self.metadata_token().await?;

        let env: Vec<serde_json::Value> =
            worker_env(spec, &self.orchestrator_url, &self.webhook_secret)
                .into_iter()
                .map(|(name, value)| json!({"name": name, "value": value}))
                .collect();

        let body = json!({
            "overrides": {
                "containerOverrides": [{"env": env}]
            }
        });

        let response = self
            .client
            .post(self.run_url())
            .bearer_auth(token)
            .json(&body)
            .timeout(LAUNCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| LaunchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LaunchError::Rejected(format!("{status}: {text}")));
        }

        let operation: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LaunchError::Rejected(e.to_string()))?;
        let name = operation
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| {
                LaunchError::Rejected("run response missing operation name".to_string())
            })?;

        // The run call returns a long-running operation; its full name
        // (projects/p/locations/r/operations/<id>) is the execution
        // identifier we track.
        let execution_id = name.to_string();

        info!(
            job_id = %spec.job_id,
            execution_id = %execution_id,
            job = %self.job_name,
            "worker execution enqueued"
        );

        Ok(execution_id)
    }
}
