//! Conductor orchestrator server.

use std::net::SocketAddr;
use std::sync::Arc;

use conductor_api::{routes, AppState, Config};
use conductor_core::Launcher;
use conductor_db::{JobStore, PgJobStore};
use conductor_launcher::{CloudRunLauncher, DryRunLauncher};
use conductor_notifier::Notifier;
use conductor_scheduler::{Dispatcher, Recovery};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    // Create database pool
    info!("Connecting to database...");
    let pool =
        conductor_db::create_pool(&config.database_url, config.max_db_connections).await?;
    conductor_db::run_migrations(&pool).await?;
    info!("Database connected");

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let notifier = Arc::new(Notifier::new(store.clone(), config.notifier_endpoint()));

    let launcher: Arc<dyn Launcher> = match &config.worker {
        Some(worker) => Arc::new(CloudRunLauncher::new(
            worker.project.clone(),
            worker.region.clone(),
            worker.job_name.clone(),
            config.orchestrator_url.clone(),
            config.webhook_secret.clone(),
        )),
        None => {
            info!("dry run: worker launches will be simulated");
            Arc::new(DryRunLauncher)
        }
    };

    // Background loops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Dispatcher::new(
        store.clone(),
        launcher,
        notifier.clone(),
        config.max_concurrent_jobs,
        config.poll_interval,
    );
    let dispatcher_handle = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { dispatcher.run(shutdown).await }
    });

    let recovery = Recovery::new(store.clone());
    let recovery_handle = tokio::spawn({
        let shutdown = shutdown_rx;
        async move { recovery.run(shutdown).await }
    });

    // Build router
    let state = AppState::new(store, notifier, config.webhook_secret.clone());
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping background loops");
    let _ = shutdown_tx.send(true);
    let _ = dispatcher_handle.await;
    let _ = recovery_handle.await;
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
