//! Application state.

use std::sync::Arc;

use conductor_db::JobStore;
use conductor_notifier::Notifier;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub notifier: Arc<Notifier>,
    /// Client for per-job callback fanout.
    pub http: reqwest::Client,
    pub webhook_secret: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        notifier: Arc<Notifier>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            http: reqwest::Client::new(),
            webhook_secret: webhook_secret.into(),
        }
    }
}
