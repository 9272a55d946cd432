//! Database layer for the Conductor build orchestrator.
//!
//! Provides the job store trait and its PostgreSQL implementation.

pub mod error;
pub mod repo;

pub use error::{DbError, DbResult};
pub use repo::*;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Open the connection pool shared by the HTTP handlers and the
/// background loops. The store is the only synchronization substrate, so
/// `max_connections` (from configuration) bounds the orchestrator's total
/// concurrency against the database.
pub async fn create_pool(database_url: &str, max_connections: u32) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Apply pending schema migrations. Runs once at startup, before the
/// dispatcher or the ingress touch the store.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
