//! Worker runtime launchers.
//!
//! Implementations of the [`conductor_core::Launcher`] trait: the Cloud Run
//! Jobs launcher used in production and a dry-run shim for local
//! development and tests.

pub mod cloud_run;
pub mod dry_run;

pub use cloud_run::CloudRunLauncher;
pub use dry_run::DryRunLauncher;

use conductor_core::LaunchSpec;

/// Container environment handed to every worker execution.
pub(crate) fn worker_env(
    spec: &LaunchSpec,
    orchestrator_url: &str,
    webhook_secret: &str,
) -> Vec<(&'static str, String)> {
    vec![
        ("JOB_ID", spec.job_id.to_string()),
        ("REPO_URL", spec.repo_url.clone()),
        ("BRANCH", spec.branch.clone()),
        ("PRD_PATH", spec.prd_path.clone()),
        ("MODE", spec.mode.clone()),
        ("ORCHESTRATOR_URL", orchestrator_url.to_string()),
        ("WEBHOOK_SECRET", webhook_secret.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::JobId;

    #[test]
    fn worker_env_carries_job_coordinates() {
        let spec = LaunchSpec {
            job_id: JobId::new(),
            repo_url: "https://github.com/acme/app".into(),
            branch: "main".into(),
            prd_path: "docs/PRD.md".into(),
            mode: "full-build".into(),
        };

        let env = worker_env(&spec, "https://orchestrator.example", "s3cret");
        let keys: Vec<&str> = env.iter().map(|(k, _)| *k).collect();

        assert_eq!(
            keys,
            [
                "JOB_ID",
                "REPO_URL",
                "BRANCH",
                "PRD_PATH",
                "MODE",
                "ORCHESTRATOR_URL",
                "WEBHOOK_SECRET"
            ]
        );
        assert_eq!(env[0].1, spec.job_id.to_string());
        assert_eq!(env[5].1, "https://orchestrator.example");
    }
}
