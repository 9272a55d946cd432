//! Launcher trait and launch types.
//!
//! Launchers hand a job descriptor to the external worker runtime and
//! return as soon as the runtime acknowledges the enqueue. The worker runs
//! for tens of minutes to hours; waiting on completion would hold claim
//! state, so terminal state is inferred from callback events instead.

use async_trait::async_trait;
use thiserror::Error;

use crate::JobId;

/// Descriptor handed to the worker runtime for one job.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub job_id: JobId,
    pub repo_url: String,
    pub branch: String,
    pub prd_path: String,
    pub mode: String,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("worker runtime auth failed: {0}")]
    Auth(String),

    #[error("worker runtime unreachable: {0}")]
    Transport(String),

    #[error("worker runtime rejected launch: {0}")]
    Rejected(String),
}

/// Trait for worker runtime launchers.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Name of this launcher.
    fn name(&self) -> &'static str;

    /// Enqueue one worker execution for the job and return the runtime's
    /// opaque execution identifier. Must not wait for the worker to finish.
    async fn launch(&self, spec: &LaunchSpec) -> Result<String, LaunchError>;
}
