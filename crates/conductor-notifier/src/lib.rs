//! Build-event normalization and fanout.
//!
//! Maps worker events to the downstream notifier's build-status vocabulary,
//! records the derived build status on the job, and posts the normalized
//! payload to the notifier endpoint. The post is fire-and-forget: failures
//! are logged and never surfaced to the caller.

pub mod mapping;

use std::sync::Arc;
use std::time::Duration;

use conductor_core::{BuildStatus, JobId};
use conductor_db::JobStore;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier returned status {0}")]
    Status(u16),

    #[error("notifier unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Downstream notifier endpoint coordinates.
#[derive(Debug, Clone)]
pub struct NotifierEndpoint {
    pub url: String,
    pub bearer: Option<String>,
}

/// Forwards normalized build events downstream.
pub struct Notifier {
    store: Arc<dyn JobStore>,
    client: reqwest::Client,
    endpoint: Option<NotifierEndpoint>,
}

impl Notifier {
    /// `endpoint = None` disables the outbound post; build status is still
    /// recorded on the job.
    pub fn new(store: Arc<dyn JobStore>, endpoint: Option<NotifierEndpoint>) -> Self {
        Self {
            store,
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    /// Forward one worker event. Unmapped events are a no-op. The message
    /// is `detail.message` when present and string-valued, else the
    /// table's default.
    pub async fn forward(&self, job_id: JobId, event: &str, detail: Option<&serde_json::Value>) {
        let Some((status, default_message)) = mapping::lookup(event) else {
            return;
        };

        let message = detail
            .and_then(|d| d.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or(default_message);

        if let Err(e) = self.store.set_build_status(job_id, status, message).await {
            error!(job_id = %job_id, event, error = %e, "failed to record build status");
        }

        self.send(job_id, status, message, None);
    }

    /// Post a build event downstream, detached from the calling request.
    /// No-op when no endpoint is configured.
    pub fn send(
        &self,
        job_id: JobId,
        status: BuildStatus,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };

        let mut payload = json!({
            "job_id": job_id.to_string(),
            "status": status.as_str(),
            "message": message,
        });
        if let Some(metadata) = metadata {
            payload["metadata"] = metadata;
        }

        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = post_build_event(&client, &endpoint, &payload).await {
                warn!(job_id = %job_id, error = %e, "notifier fanout failed");
            }
        });
    }
}

async fn post_build_event(
    client: &reqwest::Client,
    endpoint: &NotifierEndpoint,
    payload: &serde_json::Value,
) -> Result<(), NotifyError> {
    let url = format!(
        "{}/api/webhook/build-event",
        endpoint.url.trim_end_matches('/')
    );

    let mut request = client
        .post(url)
        .json(payload)
        .timeout(Duration::from_secs(10));
    if let Some(bearer) = &endpoint.bearer {
        request = request.bearer_auth(bearer);
    }

    let response = request.send().await?;
    if !response.status().is_success() {
        return Err(NotifyError::Status(response.status().as_u16()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_db::NewJob;
    use conductor_test_utils::MemoryJobStore;

    fn new_job() -> NewJob {
        NewJob {
            repo_url: "https://github.com/acme/app".into(),
            branch: "main".into(),
            prd_path: "docs/PRD.md".into(),
            mode: "full-build".into(),
            metadata: None,
            callback_url: None,
        }
    }

    #[tokio::test]
    async fn forward_records_mapped_build_status() {
        let store = Arc::new(MemoryJobStore::new());
        let notifier = Notifier::new(store.clone(), None);
        let job = store.create_job(new_job()).await.unwrap();
        let job_id = JobId::from_uuid(job.id);

        notifier.forward(job_id, "repo_cloned", None).await;

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.build_status, "cloning");
        assert_eq!(job.build_message, "Repository cloned");
    }

    #[tokio::test]
    async fn forward_prefers_detail_message() {
        let store = Arc::new(MemoryJobStore::new());
        let notifier = Notifier::new(store.clone(), None);
        let job = store.create_job(new_job()).await.unwrap();
        let job_id = JobId::from_uuid(job.id);

        let detail = json!({"message": "Cloned in 3s"});
        notifier.forward(job_id, "repo_cloned", Some(&detail)).await;

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.build_message, "Cloned in 3s");

        // Non-string message falls back to the default.
        let detail = json!({"message": 42});
        notifier.forward(job_id, "repo_cloned", Some(&detail)).await;
        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.build_message, "Repository cloned");
    }

    #[tokio::test]
    async fn forward_ignores_unmapped_events() {
        let store = Arc::new(MemoryJobStore::new());
        let notifier = Notifier::new(store.clone(), None);
        let job = store.create_job(new_job()).await.unwrap();
        let job_id = JobId::from_uuid(job.id);

        notifier.forward(job_id, "neon_provisioning", None).await;

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.build_status, "queued");
        assert_eq!(job.build_message, "Queued");
    }
}
