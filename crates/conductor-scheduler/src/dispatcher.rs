//! Polling dispatcher: concurrency gate, atomic claim, worker launch.

use std::sync::Arc;
use std::time::Duration;

use conductor_core::{JobId, JobStatus, LaunchSpec, Launcher};
use conductor_db::{DbResult, JobRecord, JobStore};
use conductor_notifier::Notifier;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Claims pending jobs and launches workers, one job per tick.
///
/// Back-pressure comes from the loop cadence, not batch size. The claim is
/// atomic at the store, so concurrent replicas never launch the same job
/// twice.
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    launcher: Arc<dyn Launcher>,
    notifier: Arc<Notifier>,
    max_running: i64,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        launcher: Arc<dyn Launcher>,
        notifier: Arc<Notifier>,
        max_running: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            launcher,
            notifier,
            max_running,
            poll_interval,
        }
    }

    /// Run the dispatch loop until shutdown is signalled. Tick errors are
    /// logged and the loop keeps going; a store outage makes ticks no-op
    /// until it recovers.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            launcher = self.launcher.name(),
            max_running = self.max_running,
            "dispatcher started"
        );

        loop {
            tokio::select! {
                _ = sleep(self.poll_interval) => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "dispatch tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("dispatcher shutting down");
                    break;
                }
            }
        }
    }

    /// One dispatch attempt: gate on the running count, claim the oldest
    /// pending job, launch it, record the outcome. Returns the claimed job
    /// id, if any.
    pub async fn tick(&self) -> DbResult<Option<JobId>> {
        let running = self.store.count_running().await?;
        if running >= self.max_running {
            return Ok(None);
        }

        let Some(job) = self.store.claim_next_pending().await? else {
            return Ok(None);
        };
        let job_id = JobId::from_uuid(job.id);
        info!(job_id = %job_id, repo_url = %job.repo_url, "claimed job");

        match self.launcher.launch(&launch_spec(&job)).await {
            Ok(execution_id) => {
                self.store.set_execution_id(job_id, &execution_id).await?;
                self.store
                    .append_event(
                        job_id,
                        "worker_launched",
                        Some(json!({"execution_id": execution_id})),
                    )
                    .await?;
                self.notifier.forward(job_id, "worker_launched", None).await;
                info!(job_id = %job_id, execution_id = %execution_id, "worker launched");
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "worker launch failed");
                self.store.set_status(job_id, JobStatus::Failed).await?;
                self.store
                    .append_event(job_id, "launch_failed", Some(json!({"error": e.to_string()})))
                    .await?;
                self.notifier.forward(job_id, "launch_failed", None).await;
            }
        }

        Ok(Some(job_id))
    }
}

fn launch_spec(job: &JobRecord) -> LaunchSpec {
    LaunchSpec {
        job_id: JobId::from_uuid(job.id),
        repo_url: job.repo_url.clone(),
        branch: job.branch.clone(),
        prd_path: job.prd_path.clone(),
        mode: job.mode.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_core::LaunchError;
    use conductor_db::NewJob;
    use conductor_test_utils::MemoryJobStore;

    struct StaticLauncher {
        execution_id: String,
    }

    #[async_trait]
    impl Launcher for StaticLauncher {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn launch(&self, _spec: &LaunchSpec) -> Result<String, LaunchError> {
            Ok(self.execution_id.clone())
        }
    }

    struct FailingLauncher;

    #[async_trait]
    impl Launcher for FailingLauncher {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn launch(&self, _spec: &LaunchSpec) -> Result<String, LaunchError> {
            Err(LaunchError::Rejected("quota exhausted".to_string()))
        }
    }

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

    fn dispatcher(
        store: Arc<MemoryJobStore>,
        launcher: Arc<dyn Launcher>,
        max_running: i64,
    ) -> Dispatcher {
        let notifier = Arc::new(Notifier::new(store.clone(), None));
        Dispatcher::new(store, launcher, notifier, max_running, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn tick_claims_oldest_pending_and_records_launch() {
        let store = Arc::new(MemoryJobStore::new());
        let first = store.create_job(new_job("https://github.com/acme/a")).await.unwrap();
        let second = store.create_job(new_job("https://github.com/acme/b")).await.unwrap();

        let launcher = Arc::new(StaticLauncher {
            execution_id: "exec-1".into(),
        });
        let d = dispatcher(store.clone(), launcher, 5);

        let claimed = d.tick().await.unwrap();
        assert_eq!(claimed, Some(JobId::from_uuid(first.id)));

        let job = store.get_job(JobId::from_uuid(first.id)).await.unwrap().unwrap();
        assert_eq!(job.status, "running");
        assert_eq!(job.worker_execution_id.as_deref(), Some("exec-1"));
        assert_eq!(job.build_status, "queued");
        assert_eq!(job.build_message, "Worker launched");

        let events = store.list_events(JobId::from_uuid(first.id)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "worker_launched");
        assert_eq!(
            events[0].detail.as_ref().unwrap()["execution_id"],
            "exec-1"
        );

        // One job per tick: the second submission is untouched.
        let other = store.get_job(JobId::from_uuid(second.id)).await.unwrap().unwrap();
        assert_eq!(other.status, "pending");
    }

    #[tokio::test]
    async fn launch_failure_fails_job_and_records_event() {
        let store = Arc::new(MemoryJobStore::new());
        let job = store.create_job(new_job("https://github.com/acme/a")).await.unwrap();
        let job_id = JobId::from_uuid(job.id);

        let d = dispatcher(store.clone(), Arc::new(FailingLauncher), 5);
        d.tick().await.unwrap();

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, "failed");
        assert_eq!(job.worker_execution_id, None);
        assert_eq!(job.build_status, "error");
        assert_eq!(job.build_message, "Failed to launch build worker");

        let events = store.list_events(job_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "launch_failed");
        let error = events[0].detail.as_ref().unwrap()["error"].as_str().unwrap();
        assert!(error.contains("quota exhausted"));
    }

    #[tokio::test]
    async fn cap_holds_excess_jobs_in_pending() {
        let store = Arc::new(MemoryJobStore::new());
        for i in 0..6 {
            store
                .create_job(new_job(&format!("https://github.com/acme/repo{i}")))
                .await
                .unwrap();
        }

        let launcher = Arc::new(StaticLauncher {
            execution_id: "exec".into(),
        });
        let d = dispatcher(store.clone(), launcher, 5);

        // Run to quiescence.
        while d.tick().await.unwrap().is_some() {}

        assert_eq!(store.count_running().await.unwrap(), 5);
        let sixth = store
            .find_active_job("https://github.com/acme/repo5", "main")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sixth.status, "pending");

        // Completing one frees a slot; the next tick promotes the sixth.
        let a_running = store
            .find_active_job("https://github.com/acme/repo0", "main")
            .await
            .unwrap()
            .unwrap();
        store
            .set_status(JobId::from_uuid(a_running.id), JobStatus::Completed)
            .await
            .unwrap();

        let promoted = d.tick().await.unwrap();
        assert!(promoted.is_some());
        assert_eq!(store.count_running().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn tick_is_noop_with_no_pending_jobs() {
        let store = Arc::new(MemoryJobStore::new());
        let launcher = Arc::new(StaticLauncher {
            execution_id: "exec".into(),
        });
        let d = dispatcher(store, launcher, 5);

        assert_eq!(d.tick().await.unwrap(), None);
    }
}
