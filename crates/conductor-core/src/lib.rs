//! Core domain types and traits for the Conductor build orchestrator.
//!
//! This crate contains:
//! - The job identity and status vocabulary
//! - The launcher trait for handing jobs to the worker runtime

pub mod job;
pub mod launcher;

pub use job::{BuildStatus, JobId, JobMode, JobStatus};
pub use launcher::{LaunchError, LaunchSpec, Launcher};
