//! API routes.

pub mod health;
pub mod jobs;
pub mod webhook;

use axum::Router;

use crate::AppState;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(webhook::router())
        .nest("/jobs", jobs::router())
        .merge(health::router())
        .with_state(state)
}
