//! Environment configuration.

use std::time::Duration;

use conductor_notifier::NotifierEndpoint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Coordinates of the pre-deployed worker job on the runtime.
#[derive(Debug, Clone)]
pub struct WorkerRuntimeConfig {
    pub project: String,
    pub region: String,
    pub job_name: String,
}

/// Orchestrator configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub max_db_connections: u32,
    pub webhook_secret: String,
    /// Public base URL of this orchestrator; workers post events back here.
    pub orchestrator_url: String,
    pub dry_run: bool,
    /// `None` in dry-run mode.
    pub worker: Option<WorkerRuntimeConfig>,
    pub poll_interval: Duration,
    pub max_concurrent_jobs: i64,
    pub notifier_url: Option<String>,
    pub notifier_bearer: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let dry_run = optional("DRY_RUN").map(|v| truthy(&v)).unwrap_or(false);

        let worker = if dry_run {
            None
        } else {
            Some(WorkerRuntimeConfig {
                project: require("GCP_PROJECT")?,
                region: require("GCP_REGION")?,
                job_name: optional("WORKER_JOB_NAME")
                    .unwrap_or_else(|| "prd-worker".to_string()),
            })
        };

        Ok(Self {
            port: parse_or("PORT", 8080)?,
            database_url: require("DATABASE_URL")?,
            max_db_connections: parse_or("DB_MAX_CONNECTIONS", 10u32)?,
            webhook_secret: require("WEBHOOK_SECRET")?,
            orchestrator_url: require("ORCHESTRATOR_URL")?,
            dry_run,
            worker,
            poll_interval: Duration::from_millis(parse_or("POLL_INTERVAL_MS", 5000u64)?),
            max_concurrent_jobs: parse_or("MAX_CONCURRENT_JOBS", 5i64)?,
            notifier_url: optional("NOTIFIER_URL"),
            notifier_bearer: optional("NOTIFIER_BEARER"),
        })
    }

    pub fn notifier_endpoint(&self) -> Option<NotifierEndpoint> {
        self.notifier_url.as_ref().map(|url| NotifierEndpoint {
            url: url.clone(),
            bearer: self.notifier_bearer.clone(),
        })
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(v) => v
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        None => Ok(default),
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        assert!(truthy("true"));
        assert!(truthy("TRUE"));
        assert!(truthy("1"));
        assert!(truthy(" yes "));
        assert!(!truthy("false"));
        assert!(!truthy("0"));
        assert!(!truthy(""));
    }
}
