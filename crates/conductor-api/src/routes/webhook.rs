//! Build submission webhook.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use conductor_core::{BuildStatus, JobId, JobMode};
use conductor_db::NewJob;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::auth::require_bearer;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(submit))
}

#[derive(Debug, Deserialize)]
struct WebhookRequest {
    repo_url: Option<String>,
    branch: Option<String>,
    prd_path: Option<String>,
    mode: Option<String>,
    metadata: Option<Value>,
    callback_url: Option<String>,
}

async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_bearer(&headers, &state.webhook_secret)?;

    let request: WebhookRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("invalid JSON body: {e}"), None))?;
    let new = validate(request)?;

    // Active jobs for the same repo/branch dedup to the existing job.
    if let Some(existing) = state
        .store
        .find_active_job(&new.repo_url, &new.branch)
        .await?
    {
        info!(
            job_id = %existing.id,
            repo_url = %new.repo_url,
            branch = %new.branch,
            "duplicate submission, returning active job"
        );
        return Ok((
            StatusCode::OK,
            Json(json!({
                "job_id": existing.id,
                "status": existing.status,
                "deduplicated": true,
            })),
        ));
    }

    let metadata = new.metadata.clone();
    let job = state.store.create_job(new).await?;
    info!(job_id = %job.id, repo_url = %job.repo_url, branch = %job.branch, "job created");

    state.notifier.send(
        JobId::from_uuid(job.id),
        BuildStatus::Queued,
        "Build queued",
        metadata,
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "job_id": job.id, "status": "pending" })),
    ))
}

fn validate(request: WebhookRequest) -> Result<NewJob, ApiError> {
    let mut details = Map::new();

    let repo_url = request.repo_url.unwrap_or_default();
    if repo_url.is_empty() {
        details.insert("repo_url".into(), json!("is required"));
    } else if !is_github_url(&repo_url) {
        details.insert("repo_url".into(), json!("must be a GitHub repository URL"));
    }

    let branch = request.branch.unwrap_or_else(|| "main".to_string());
    if branch.is_empty() {
        details.insert("branch".into(), json!("must not be empty"));
    }

    let prd_path = request.prd_path.unwrap_or_else(|| "docs/PRD.md".to_string());
    if prd_path.is_empty() {
        details.insert("prd_path".into(), json!("must not be empty"));
    }

    let mode = request
        .mode
        .unwrap_or_else(|| JobMode::default().as_str().to_string());
    if mode.parse::<JobMode>().is_err() {
        details.insert(
            "mode".into(),
            json!("must be one of full-build, deploy-only, auto"),
        );
    }

    if let Some(metadata) = &request.metadata {
        if !metadata.is_object() {
            details.insert("metadata".into(), json!("must be an object"));
        }
    }

    if let Some(callback_url) = &request.callback_url {
        if !callback_url.starts_with("http://") && !callback_url.starts_with("https://") {
            details.insert("callback_url".into(), json!("must be an http(s) URL"));
        }
    }

    if !details.is_empty() {
        return Err(ApiError::validation(
            "invalid request body",
            Some(Value::Object(details)),
        ));
    }

    Ok(NewJob {
        repo_url,
        branch,
        prd_path,
        mode,
        metadata: request.metadata,
        callback_url: request.callback_url,
    })
}

fn is_github_url(url: &str) -> bool {
    url.strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))
        .is_some_and(|rest| !rest.is_empty())
}
