//! Job repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::{BuildStatus, JobId, JobStatus};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{DbError, DbResult};

/// A job row in the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: uuid::Uuid,
    pub repo_url: String,
    pub branch: String,
    pub prd_path: String,
    pub mode: String,
    pub status: String,
    pub build_status: String,
    pub build_message: String,
    pub metadata: Option<serde_json::Value>,
    pub callback_url: Option<String>,
    pub worker_execution_id: Option<String>,
    pub pr_url: Option<String>,
    pub live_url: Option<String>,
    pub deploy_site_id: Option<String>,
    pub db_project_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An append-only job event row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobEventRecord {
    pub id: uuid::Uuid,
    pub job_id: uuid::Uuid,
    pub event: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub repo_url: String,
    pub branch: String,
    pub prd_path: String,
    pub mode: String,
    pub metadata: Option<serde_json::Value>,
    pub callback_url: Option<String>,
}

/// Deployment facts extracted from a `deployed` event.
#[derive(Debug, Clone, Default)]
pub struct DeployFacts {
    pub live_url: Option<String>,
    pub deploy_site_id: Option<String>,
    pub db_project_id: Option<String>,
}

impl DeployFacts {
    pub fn is_empty(&self) -> bool {
        self.live_url.is_none() && self.deploy_site_id.is_none() && self.db_project_id.is_none()
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in `pending` with `queued` build status.
    async fn create_job(&self, new: NewJob) -> DbResult<JobRecord>;

    /// Most recently created job in `{pending, running}` for the tuple.
    /// Used for webhook dedup.
    async fn find_active_job(
        &self,
        repo_url: &str,
        branch: &str,
    ) -> DbResult<Option<JobRecord>>;

    async fn get_job(&self, id: JobId) -> DbResult<Option<JobRecord>>;

    /// Atomically claim the oldest `pending` job, transitioning it to
    /// `running`. Race-free across concurrent callers.
    async fn claim_next_pending(&self) -> DbResult<Option<JobRecord>>;

    async fn count_running(&self) -> DbResult<i64>;

    /// Record the launcher's execution id. Written at most once per job;
    /// later attempts are ignored.
    async fn set_execution_id(&self, id: JobId, execution_id: &str) -> DbResult<()>;

    /// Write the orchestration status and bump `updated_at`. Transitions
    /// out of a terminal state are silently refused.
    async fn set_status(&self, id: JobId, status: JobStatus) -> DbResult<()>;

    /// Touch `updated_at` without a status change. Called on every event
    /// ingest so the stale sweep sees live workers.
    async fn bump_updated_at(&self, id: JobId) -> DbResult<()>;

    /// Append a job event. `DbError::NotFound` if the job does not exist.
    async fn append_event(
        &self,
        job_id: JobId,
        event: &str,
        detail: Option<serde_json::Value>,
    ) -> DbResult<JobEventRecord>;

    /// Events for a job, ordered by `created_at` with id as tie-break.
    async fn list_events(&self, job_id: JobId) -> DbResult<Vec<JobEventRecord>>;

    async fn set_pr_url(&self, id: JobId, pr_url: &str) -> DbResult<()>;

    async fn set_deploy_facts(&self, id: JobId, facts: DeployFacts) -> DbResult<()>;

    async fn set_build_status(
        &self,
        id: JobId,
        status: BuildStatus,
        message: &str,
    ) -> DbResult<()>;

    /// Fail every `running` job whose `updated_at` is older than the
    /// threshold. Returns the number of jobs transitioned.
    async fn sweep_stale(&self, threshold_minutes: i32) -> DbResult<u64>;

    /// Round-trip to the store, for health checks.
    async fn ping(&self) -> DbResult<()>;
}

/// PostgreSQL implementation of [`JobStore`].
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, new: NewJob) -> DbResult<JobRecord> {
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            INSERT INTO jobs (id, repo_url, branch, prd_path, mode, status, build_status, build_message, metadata, callback_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', 'queued', 'Queued', $6, $7, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(&new.repo_url)
        .bind(&new.branch)
        .bind(&new.prd_path)
        .bind(&new.mode)
        .bind(&new.metadata)
        .bind(&new.callback_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_active_job(
        &self,
        repo_url: &str,
        branch: &str,
    ) -> DbResult<Option<JobRecord>> {
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            SELECT * FROM jobs
            WHERE repo_url = $1 AND branch = $2 AND status IN ('pending', 'running')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(repo_url)
        .bind(branch)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn get_job(&self, id: JobId) -> DbResult<Option<JobRecord>> {
        let record = sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn claim_next_pending(&self) -> DbResult<Option<JobRecord>> {
        // Single round trip; SKIP LOCKED keeps concurrent dispatcher
        // replicas from claiming the same job.
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            UPDATE jobs
            SET status = 'running', updated_at = NOW()
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'pending'
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn count_running(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = 'running'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn set_execution_id(&self, id: JobId, execution_id: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET worker_execution_id = $2, updated_at = NOW()
            WHERE id = $1 AND worker_execution_id IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(execution_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, id: JobId, status: JobStatus) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bump_updated_at(&self, id: JobId) -> DbResult<()> {
        sqlx::query("UPDATE jobs SET updated_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_event(
        &self,
        job_id: JobId,
        event: &str,
        detail: Option<serde_json::Value>,
    ) -> DbResult<JobEventRecord> {
        let record = sqlx::query_as::<_, JobEventRecord>(
            r#"
            INSERT INTO job_events (id, job_id, event, detail, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(job_id.as_uuid())
        .bind(event)
        .bind(&detail)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                DbError::NotFound(format!("job {job_id}"))
            }
            _ => DbError::from(e),
        })?;
        Ok(record)
    }

    async fn list_events(&self, job_id: JobId) -> DbResult<Vec<JobEventRecord>> {
        let records = sqlx::query_as::<_, JobEventRecord>(
            "SELECT * FROM job_events WHERE job_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(job_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn set_pr_url(&self, id: JobId, pr_url: &str) -> DbResult<()> {
        sqlx::query("UPDATE jobs SET pr_url = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(pr_url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_deploy_facts(&self, id: JobId, facts: DeployFacts) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET
                live_url = COALESCE($2, live_url),
                deploy_site_id = COALESCE($3, deploy_site_id),
                db_project_id = COALESCE($4, db_project_id),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&facts.live_url)
        .bind(&facts.deploy_site_id)
        .bind(&facts.db_project_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_build_status(
        &self,
        id: JobId,
        status: BuildStatus,
        message: &str,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET build_status = $2, build_message = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sweep_stale(&self, threshold_minutes: i32) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'failed', updated_at = NOW()
            WHERE status = 'running' AND updated_at < NOW() - make_interval(mins => $1)
            "#,
        )
        .bind(threshold_minutes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
