//! Stale-job recovery.
//!
//! Worker launch is fire-and-forget and terminal events can be lost, so a
//! running job whose worker has gone quiet would stay `running` forever.
//! The sweep fails every running job whose `updated_at` has not advanced
//! within the threshold. Swept jobs get no synthetic event and no notifier
//! message; the count is logged instead.

use std::sync::Arc;
use std::time::Duration;

use conductor_db::JobStore;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Larger than any legitimate quiet interval between worker events, small
/// enough to bound how long a stuck job holds a concurrency slot.
pub const STALE_THRESHOLD_MINUTES: i32 = 30;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Periodic sweep that fails abandoned running jobs.
pub struct Recovery {
    store: Arc<dyn JobStore>,
    threshold_minutes: i32,
    interval: Duration,
}

impl Recovery {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            threshold_minutes: STALE_THRESHOLD_MINUTES,
            interval: SWEEP_INTERVAL,
        }
    }

    pub fn with_threshold(mut self, threshold_minutes: i32) -> Self {
        self.threshold_minutes = threshold_minutes;
        self
    }

    /// Sweep on startup, then on every interval, until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            threshold_minutes = self.threshold_minutes,
            "recovery started"
        );
        self.sweep().await;

        loop {
            tokio::select! {
                _ = sleep(self.interval) => self.sweep().await,
                _ = shutdown.changed() => {
                    info!("recovery shutting down");
                    break;
                }
            }
        }
    }

    pub async fn sweep(&self) {
        match self.store.sweep_stale(self.threshold_minutes).await {
            Ok(0) => {}
            Ok(count) => warn!(count, "marked stale running jobs as failed"),
            Err(e) => error!(error = %e, "stale sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use conductor_core::JobId;
    use conductor_db::NewJob;
    use conductor_test_utils::MemoryJobStore;

    fn new_job(repo: &str) -> NewJob {
        NewJob {
            repo_url: repo.to_string(),
            branch: "main".into(),
            prd_path: "docs/PRD.md".into(),
            mode: "full-build".into(),
            metadata: None,
            callback_url: None,
        }
    }

    #[tokio::test]
    async fn sweep_fails_stale_running_jobs_only() {
        let store = Arc::new(MemoryJobStore::new());

        store.create_job(new_job("https://github.com/acme/stale")).await.unwrap();
        let stale = store.claim_next_pending().await.unwrap().unwrap();
        store.backdate_updated_at(
            JobId::from_uuid(stale.id),
            Utc::now() - ChronoDuration::minutes(31),
        );

        store.create_job(new_job("https://github.com/acme/fresh")).await.unwrap();
        let fresh = store.claim_next_pending().await.unwrap().unwrap();

        // A pending job older than the threshold is not running and must
        // not be swept.
        let idle = store.create_job(new_job("https://github.com/acme/idle")).await.unwrap();
        store.backdate_updated_at(
            JobId::from_uuid(idle.id),
            Utc::now() - ChronoDuration::minutes(45),
        );

        let swept = store.sweep_stale(30).await.unwrap();
        assert_eq!(swept, 1);

        let stale = store.get_job(JobId::from_uuid(stale.id)).await.unwrap().unwrap();
        assert_eq!(stale.status, "failed");
        let fresh = store.get_job(JobId::from_uuid(fresh.id)).await.unwrap().unwrap();
        assert_eq!(fresh.status, "running");
        let idle = store.get_job(JobId::from_uuid(idle.id)).await.unwrap().unwrap();
        assert_eq!(idle.status, "pending");

        // Swept jobs get no synthetic event.
        let events = store.list_events(JobId::from_uuid(stale.id)).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let store = Arc::new(MemoryJobStore::new());
        store.create_job(new_job("https://github.com/acme/app")).await.unwrap();
        let job = store.claim_next_pending().await.unwrap().unwrap();
        store.backdate_updated_at(
            JobId::from_uuid(job.id),
            Utc::now() - ChronoDuration::minutes(31),
        );

        let recovery = Recovery::new(store.clone());
        recovery.sweep().await;
        assert_eq!(store.sweep_stale(30).await.unwrap(), 0);
    }
}
