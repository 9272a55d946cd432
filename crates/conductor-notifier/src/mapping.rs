//! Worker event to build-status mapping.

use conductor_core::BuildStatus;

/// Resolve a worker event to the build status and default message the
/// downstream notifier understands. Events outside this table carry no
/// build-status meaning and are not forwarded (they still land in the
/// event log).
pub fn lookup(event: &str) -> Option<(BuildStatus, &'static str)> {
    use BuildStatus::*;

    let mapped = match event {
        "worker_launched" => (Queued, "Worker launched"),
        "worker_started" => (Queued, "Build starting..."),
        "repo_cloned" => (Cloning, "Repository cloned"),
        "prd_parsed" => (Building, "PRD parsed, planning build..."),
        "orchestrator_started" => (Building, "Building application..."),
        "orchestrator_complete" => (Building, "Build complete, preparing for deployment..."),
        "deploy_started" => (Deploying, "Starting deployment..."),
        "readiness_check" => (Deploying, "Checking deployment readiness..."),
        "readiness_passed" => (Deploying, "Deployment readiness check passed"),
        "readiness_fixing" => (Deploying, "Fixing build issues before deployment..."),
        "readiness_failed" => (Error, "Deployment readiness check failed"),
        "deploy_verifying" => (Deploying, "Verifying deployment..."),
        "deployed" => (Deployed, "Deployed successfully"),
        "completed" => (Deployed, "Build completed successfully"),
        "build_complete" => (Deployed, "Build completed successfully"),
        "pr_created" => (Building, "Pull request created"),
        "build_failed" => (Failed, "Build failed"),
        "failed" => (Failed, "Build failed"),
        "launch_failed" => (Error, "Failed to launch build worker"),
        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_events_map_to_expected_status() {
        let cases = [
            ("worker_launched", BuildStatus::Queued, "Worker launched"),
            ("worker_started", BuildStatus::Queued, "Build starting..."),
            ("repo_cloned", BuildStatus::Cloning, "Repository cloned"),
            (
                "prd_parsed",
                BuildStatus::Building,
                "PRD parsed, planning build...",
            ),
            (
                "orchestrator_started",
                BuildStatus::Building,
                "Building application...",
            ),
            (
                "orchestrator_complete",
                BuildStatus::Building,
                "Build complete, preparing for deployment...",
            ),
            (
                "deploy_started",
                BuildStatus::Deploying,
                "Starting deployment...",
            ),
            (
                "readiness_check",
                BuildStatus::Deploying,
                "Checking deployment readiness...",
            ),
            (
                "readiness_passed",
                BuildStatus::Deploying,
                "Deployment readiness check passed",
            ),
            (
                "readiness_fixing",
                BuildStatus::Deploying,
                "Fixing build issues before deployment...",
            ),
            (
                "readiness_failed",
                BuildStatus::Error,
                "Deployment readiness check failed",
            ),
            (
                "deploy_verifying",
                BuildStatus::Deploying,
                "Verifying deployment...",
            ),
            ("deployed", BuildStatus::Deployed, "Deployed successfully"),
            (
                "completed",
                BuildStatus::Deployed,
                "Build completed successfully",
            ),
            (
                "build_complete",
                BuildStatus::Deployed,
                "Build completed successfully",
            ),
            ("pr_created", BuildStatus::Building, "Pull request created"),
            ("build_failed", BuildStatus::Failed, "Build failed"),
            ("failed", BuildStatus::Failed, "Build failed"),
            (
                "launch_failed",
                BuildStatus::Error,
                "Failed to launch build worker",
            ),
        ];

        for (event, status, message) in cases {
            assert_eq!(lookup(event), Some((status, message)), "event {event}");
        }
    }

    #[test]
    fn unmapped_events_are_ignored() {
        assert_eq!(lookup("neon_provisioning"), None);
        assert_eq!(lookup("schema_migrating"), None);
        assert_eq!(lookup(""), None);
    }
}
