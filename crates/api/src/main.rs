use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use magnetar_agent::AgentClient;
use magnetar_api::background;
use magnetar_api::config::ServerConfig;
use magnetar_api::router::build_app_router;
use magnetar_api::state::AppState;
use magnetar_aria2::Aria2Client;
use magnetar_events::EventBus;
use magnetar_sync::{PostCompleteHook, Reconciler, SyncConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "magnetar_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = magnetar_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    magnetar_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    magnetar_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- aria2 client ---
    let aria2 = Arc::new(Aria2Client::from_env());

    // --- Classification agent (optional) ---
    let agent = AgentClient::from_env();
    if agent.is_none() {
        tracing::info!("No classification agent configured; completed downloads stay in place");
    }

    // --- Reconciliation engine ---
    let sync_config = SyncConfig::from_env();
    let hook = Arc::new(PostCompleteHook::new(
        pool.clone(),
        Arc::clone(&aria2),
        agent,
        sync_config,
    ));
    let reconciler = Arc::new(Reconciler::new(pool.clone(), Arc::clone(&aria2), hook));

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    // --- Background sync task ---
    let sync_cancel = CancellationToken::new();
    let sync_handle = tokio::spawn(background::sync_task::run(
        Arc::clone(&reconciler),
        Arc::clone(&event_bus),
        config.sync_interval_secs,
        sync_cancel.clone(),
    ));
    tracing::info!("Background reconciliation task started");

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        aria2,
        event_bus,
        reconciler,
    };

    // --- Router ---
    let app = build_app_router(state);

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

    sync_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sync_handle).await;
    tracing::info!("Background reconciliation task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
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
