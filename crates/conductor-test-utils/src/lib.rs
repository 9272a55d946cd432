//! Shared test utilities for Conductor integration tests.
//!
//! [`MemoryJobStore`] is an in-memory [`JobStore`] that mirrors the SQL
//! contracts of the PostgreSQL store: the terminal-state guard on status
//! writes, the write-once execution id, claim ordering by creation time,
//! and event ordering by `(created_at, id)`. Scheduler and API tests run
//! against it without a database.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use conductor_core::{BuildStatus, JobId, JobStatus};
use conductor_db::{DbError, DbResult, DeployFacts, JobEventRecord, JobRecord, JobStore, NewJob};

#[derive(Default)]
struct Inner {
    jobs: Vec<JobRecord>,
    events: Vec<JobEventRecord>,
}

/// In-memory job store for tests.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind a job's `updated_at`, e.g. to exercise the stale sweep.
    pub fn backdate_updated_at(&self, id: JobId, updated_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.iter_mut().find(|j| j.id == *id.as_uuid()) {
            job.updated_at = updated_at;
        }
    }

    fn with_job<T>(
        &self,
        id: JobId,
        f: impl FnOnce(&mut JobRecord) -> T,
    ) -> DbResult<Option<T>> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .iter_mut()
            .find(|j| j.id == *id.as_uuid())
            .map(f))
    }
}

fn is_terminal(status: &str) -> bool {
    status == JobStatus::Completed.as_str() || status == JobStatus::Failed.as_str()
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, new: NewJob) -> DbResult<JobRecord> {
        let now = Utc::now();
        let record = JobRecord {
            id: uuid::Uuid::now_v7(),
            repo_url: new.repo_url,
            branch: new.branch,
            prd_path: new.prd_path,
            mode: new.mode,
            status: "pending".into(),
            build_status: "queued".into(),
            build_message: "Queued".into(),
            metadata: new.metadata,
            callback_url: new.callback_url,
            worker_execution_id: None,
            pr_url: None,
            live_url: None,
            deploy_site_id: None,
            db_project_id: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().unwrap().jobs.push(record.clone());
        Ok(record)
    }

    async fn find_active_job(
        &self,
        repo_url: &str,
        branch: &str,
    ) -> DbResult<Option<JobRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .iter()
            .filter(|j| {
                j.repo_url == repo_url
                    && j.branch == branch
                    && (j.status == "pending" || j.status == "running")
            })
            .max_by_key(|j| (j.created_at, j.id))
            .cloned())
    }

    async fn get_job(&self, id: JobId) -> DbResult<Option<JobRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.jobs.iter().find(|j| j.id == *id.as_uuid()).cloned())
    }

    async fn claim_next_pending(&self) -> DbResult<Option<JobRecord>> {
        let mut inner = self.inner.lock().unwrap();
        let oldest = inner
            .jobs
            .iter()
            .filter(|j| j.status == "pending")
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id);
        let Some(id) = oldest else {
            return Ok(None);
        };
        let job = inner.jobs.iter_mut().find(|j| j.id == id).unwrap();
        job.status = "running".into();
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn count_running(&self) -> DbResult<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.jobs.iter().filter(|j| j.status == "running").count() as i64)
    }

    async fn set_execution_id(&self, id: JobId, execution_id: &str) -> DbResult<()> {
        self.with_job(id, |job| {
            if job.worker_execution_id.is_none() {
                job.worker_execution_id = Some(execution_id.to_string());
                job.updated_at = Utc::now();
            }
        })?;
        Ok(())
    }

    async fn set_status(&self, id: JobId, status: JobStatus) -> DbResult<()> {
        self.with_job(id, |job| {
            if !is_terminal(&job.status) {
                job.status = status.as_str().into();
                job.updated_at = Utc::now();
            }
        })?;
        Ok(())
    }

    async fn bump_updated_at(&self, id: JobId) -> DbResult<()> {
        self.with_job(id, |job| {
            job.updated_at = Utc::now();
        })?;
        Ok(())
    }

    async fn append_event(
        &self,
        job_id: JobId,
        event: &str,
        detail: Option<serde_json::Value>,
    ) -> DbResult<JobEventRecord> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.jobs.iter().any(|j| j.id == *job_id.as_uuid()) {
            return Err(DbError::NotFound(format!("job {job_id}")));
        }
        let record = JobEventRecord {
            id: uuid::Uuid::now_v7(),
            job_id: *job_id.as_uuid(),
            event: event.to_string(),
            detail,
            created_at: Utc::now(),
        };
        inner.events.push(record.clone());
        Ok(record)
    }

    async fn list_events(&self, job_id: JobId) -> DbResult<Vec<JobEventRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<JobEventRecord> = inner
            .events
            .iter()
            .filter(|e| e.job_id == *job_id.as_uuid())
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.created_at, e.id));
        Ok(events)
    }

    async fn set_pr_url(&self, id: JobId, pr_url: &str) -> DbResult<()> {
        self.with_job(id, |job| {
            job.pr_url = Some(pr_url.to_string());
            job.updated_at = Utc::now();
        })?;
        Ok(())
    }

    async fn set_deploy_facts(&self, id: JobId, facts: DeployFacts) -> DbResult<()> {
        self.with_job(id, |job| {
            if facts.live_url.is_some() {
                job.live_url = facts.live_url;
            }
            if facts.deploy_site_id.is_some() {
                job.deploy_site_id = facts.deploy_site_id;
            }
            if facts.db_project_id.is_some() {
                job.db_project_id = facts.db_project_id;
            }
            job.updated_at = Utc::now();
        })?;
        Ok(())
    }

    async fn set_build_status(
        &self,
        id: JobId,
        status: BuildStatus,
        message: &str,
    ) -> DbResult<()> {
        self.with_job(id, |job| {
            job.build_status = status.as_str().into();
            job.build_message = message.to_string();
            job.updated_at = Utc::now();
        })?;
        Ok(())
    }

    async fn sweep_stale(&self, threshold_minutes: i32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::minutes(threshold_minutes as i64);
        let mut inner = self.inner.lock().unwrap();
        let mut swept = 0;
        for job in inner
            .jobs
            .iter_mut()
            .filter(|j| j.status == "running" && j.updated_at < cutoff)
        {
            job.status = "failed".into();
            job.updated_at = Utc::now();
            swept += 1;
        }
        Ok(swept)
    }

    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }
}
