//! HTTP ingress for the Conductor build orchestrator.
//!
//! Exposes the webhook submit endpoint, the worker event callback, job
//! status reads, and the health check.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use state::AppState;
