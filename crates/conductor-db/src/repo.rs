//! Repository traits and PostgreSQL implementations.

pub mod job;

pub use job::{DeployFacts, JobEventRecord, JobRecord, JobStore, NewJob, PgJobStore};
