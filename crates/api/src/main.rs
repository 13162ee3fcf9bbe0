use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use segflow_api::config::ServerConfig;
use segflow_api::router::build_app_router;
use segflow_api::state::AppState;
use segflow_core::store::LabelStore;
use segflow_db::store::PgLabelStore;
use segflow_events::ProgressBroadcaster;
use segflow_inference::{InferenceManager, RemoteDevice};
use segflow_pipeline::{retention, PropagationOrchestrator};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "segflow_api=debug,segflow_pipeline=debug,segflow_inference=info,tower_http=debug"
                    .into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = segflow_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    segflow_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    segflow_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store: Arc<dyn LabelStore> = Arc::new(PgLabelStore::new(pool));

    // --- Segmentation devices ---
    let handle = tokio::runtime::Handle::current();
    let inference = config
        .inference_device_urls
        .iter()
        .enumerate()
        .fold(InferenceManager::new(config.inference_width), |manager, (i, url)| {
            manager.with_device(Box::new(RemoteDevice::new(
                format!("device-{i}"),
                url.as_str(),
                handle.clone(),
            )))
        });
    if inference.device_count() == 0 {
        tracing::warn!("No segmentation devices configured; propagation jobs will fail");
    }
    let inference = Arc::new(inference);

    // --- Orchestrator ---
    let broadcaster = Arc::new(ProgressBroadcaster::new());
    let orchestrator = Arc::new(PropagationOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&inference),
        Arc::clone(&broadcaster),
        config.pipeline_config(),
    ));

    // Spawn job retention sweeper.
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(retention::run(
        Arc::clone(&orchestrator),
        Duration::from_secs(config.job_retention_secs),
        retention::SWEEP_INTERVAL,
        retention_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        store,
        config: Arc::new(config.clone()),
        inference,
        orchestrator: Arc::clone(&orchestrator),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Running jobs get a drain budget before they are aborted.
    let drained = orchestrator
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    tracing::info!(drained, "Propagation jobs shut down");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Job retention sweeper stopped");

    broadcaster.close_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
