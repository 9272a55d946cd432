//! Worker event callback and job status endpoints.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use conductor_core::{JobId, JobStatus};
use conductor_db::{DeployFacts, JobEventRecord, JobRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::auth::require_bearer;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/events", post(ingest_event))
        .route("/{id}/status", get(status))
}

#[derive(Debug, Deserialize)]
struct EventRequest {
    event: Option<String>,
    detail: Option<Value>,
}

/// Worker callback. Appends the event, keeps `updated_at` fresh for the
/// stale sweep, extracts deployment facts, advances terminal status, and
/// fans the event out.
async fn ingest_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_bearer(&headers, &state.webhook_secret)?;

    let request: EventRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("invalid JSON body: {e}"), None))?;

    let event = request.event.unwrap_or_default();
    if event.is_empty() {
        return Err(ApiError::validation(
            "invalid request body",
            Some(json!({"event": "is required"})),
        ));
    }
    if let Some(detail) = &request.detail {
        if !detail.is_object() {
            return Err(ApiError::validation(
                "invalid request body",
                Some(json!({"detail": "must be an object"})),
            ));
        }
    }

    let job_id = parse_job_id(&id)?;
    let Some(job) = state.store.get_job(job_id).await? else {
        return Err(ApiError::NotFound(format!("job {id}")));
    };

    state
        .store
        .append_event(job_id, &event, request.detail.clone())
        .await?;
    // Always, whether or not the event changes state: the stale sweep
    // treats updated_at as proof of a live worker.
    state.store.bump_updated_at(job_id).await?;

    match event.as_str() {
        "pr_created" => {
            if let Some(pr_url) = detail_str(&request.detail, "pr_url") {
                state.store.set_pr_url(job_id, &pr_url).await?;
            }
        }
        "deployed" => {
            let facts = DeployFacts {
                live_url: detail_str(&request.detail, "live_url"),
                deploy_site_id: detail_str(&request.detail, "netlify_site_id"),
                db_project_id: detail_str(&request.detail, "neon_project_id"),
            };
            if !facts.is_empty() {
                state.store.set_deploy_facts(job_id, facts).await?;
            }
        }
        "failed" | "build_failed" => {
            state.store.set_status(job_id, JobStatus::Failed).await?;
        }
        "completed" | "build_complete" => {
            state.store.set_status(job_id, JobStatus::Completed).await?;
        }
        _ => {}
    }

    state
        .notifier
        .forward(job_id, &event, request.detail.as_ref())
        .await;

    if let Some(callback_url) = job.callback_url {
        let payload = json!({
            "job_id": job.id,
            "event": event,
            "detail": request.detail,
        });
        let client = state.http.clone();
        let cb_job_id = job.id;
        tokio::spawn(async move {
            let result = client
                .post(&callback_url)
                .json(&payload)
                .timeout(Duration::from_secs(10))
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                warn!(job_id = %cb_job_id, error = %e, "job callback fanout failed");
            }
        });
    }

    Ok((StatusCode::CREATED, Json(json!({ "ok": true }))))
}

#[derive(Debug, Serialize)]
struct EventView {
    event: String,
    detail: Option<Value>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    job_id: uuid::Uuid,
    status: String,
    build_status: String,
    build_message: String,
    repo_url: String,
    branch: String,
    prd_path: String,
    mode: String,
    worker_execution_id: Option<String>,
    pr_url: Option<String>,
    live_url: Option<String>,
    deploy_site_id: Option<String>,
    db_project_id: Option<String>,
    metadata: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<EventView>,
}

async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let job_id = parse_job_id(&id)?;
    let Some(job) = state.store.get_job(job_id).await? else {
        return Err(ApiError::NotFound(format!("job {id}")));
    };
    let events = state.store.list_events(job_id).await?;
    Ok(Json(status_response(job, events)))
}

fn status_response(job: JobRecord, events: Vec<JobEventRecord>) -> StatusResponse {
    StatusResponse {
        job_id: job.id,
        status: job.status,
        build_status: job.build_status,
        build_message: job.build_message,
        repo_url: job.repo_url,
        branch: job.branch,
        prd_path: job.prd_path,
        mode: job.mode,
        worker_execution_id: job.worker_execution_id,
        pr_url: job.pr_url,
        live_url: job.live_url,
        deploy_site_id: job.deploy_site_id,
        db_project_id: job.db_project_id,
        metadata: job.metadata,
        created_at: job.created_at,
        updated_at: job.updated_at,
        events: events
            .into_iter()
            .map(|e| EventView {
                event: e.event,
                detail: e.detail,
                created_at: e.created_at,
            })
            .collect(),
    }
}

fn detail_str(detail: &Option<Value>, key: &str) -> Option<String> {
    detail
        .as_ref()
        .and_then(|d| d.get(key))
        .and_then(|v| v.as_str())
        .map(String::from)
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("invalid job id: {raw}"), None))
}
