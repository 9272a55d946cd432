//! Job identity and the orchestration and build status vocabulary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a single build job.
///
/// Ids are UUIDv7, so submission order is embedded in the id itself: the
/// oldest-pending claim and the event-log tie-break both reduce to a plain
/// ordered comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Coarse orchestration lifecycle of a job.
///
/// Transitions form a DAG: `pending -> running -> {completed, failed}`,
/// plus `pending -> failed` on launch failure. Terminal states are never
/// left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained worker-facing build state, derived from worker events.
/// Advisory only; the orchestration lifecycle is [`JobStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Queued,
    Cloning,
    Installing,
    Building,
    Testing,
    Deploying,
    Deployed,
    Completed,
    Error,
    Failed,
    Cancelled,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Queued => "queued",
            BuildStatus::Cloning => "cloning",
            BuildStatus::Installing => "installing",
            BuildStatus::Building => "building",
            BuildStatus::Testing => "testing",
            BuildStatus::Deploying => "deploying",
            BuildStatus::Deployed => "deployed",
            BuildStatus::Completed => "completed",
            BuildStatus::Error => "error",
            BuildStatus::Failed => "failed",
            BuildStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the worker should treat the build.
///
/// Stored and handed to the worker environment; the orchestrator itself
/// never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobMode {
    #[serde(rename = "full-build")]
    FullBuild,
    #[serde(rename = "deploy-only")]
    DeployOnly,
    #[serde(rename = "auto")]
    Auto,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::FullBuild => "full-build",
            JobMode::DeployOnly => "deploy-only",
            JobMode::Auto => "auto",
        }
    }
}

impl Default for JobMode {
    fn default() -> Self {
        JobMode::FullBuild
    }
}

impl std::fmt::Display for JobMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full-build" => Ok(JobMode::FullBuild),
            "deploy-only" => Ok(JobMode::DeployOnly),
            "auto" => Ok(JobMode::Auto),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_parses_and_displays() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-job-id".parse::<JobId>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn mode_round_trips() {
        for mode in [JobMode::FullBuild, JobMode::DeployOnly, JobMode::Auto] {
            assert_eq!(mode.as_str().parse::<JobMode>().unwrap(), mode);
        }
        assert!("partial-build".parse::<JobMode>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&BuildStatus::Deployed).unwrap(),
            "\"deployed\""
        );
        assert_eq!(
            serde_json::to_string(&JobMode::DeployOnly).unwrap(),
            "\"deploy-only\""
        );
    }
}
