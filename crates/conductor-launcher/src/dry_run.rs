//! Dry-run launcher.

use async_trait::async_trait;
use conductor_core::{LaunchError, LaunchSpec, Launcher};
use tracing::info;

/// Launcher that contacts no runtime. Logs the launch intent and returns a
/// deterministic synthetic execution id derived from the job id.
pub struct DryRunLauncher;

#[async_trait]
impl Launcher for DryRunLauncher {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn launch(&self, spec: &LaunchSpec) -> Result<String, LaunchError> {
        info!(
            job_id = %spec.job_id,
            repo_url = %spec.repo_url,
            branch = %spec.branch,
            "dry run: skipping worker launch"
        );
        let id = spec.job_id.to_string();
        Ok(format!("dry-run-{}", &id[..8]))
    }
}
