//! Fedlink server binary.
//!
//! Starts the Control API with structured logging, database initialization,
//! the federation supervisor and its background tasks, and shuts everything
//! down in order on SIGTERM/SIGINT.

use fedlink_link::Supervisor;
use fedlink_server::{app, background, config, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

/// How long the status writer gets to drain after the supervisor stops.
const STATUS_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("FEDLINK_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration; the server cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let (pool, applied) =
        fedlink_db::open_and_migrate(&config.database.path, config.database.runtime_settings())
            .expect("failed to initialize database; check database.path in config");
    if applied > 0 {
        tracing::info!(count = applied, "applied database migrations");
    }

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for status reset");
        let reset = fedlink_registry::reset_link_status(&conn)
            .expect("failed to reset stale link status");
        if reset > 0 {
            tracing::info!(count = reset, "reset link status left over from previous run");
        }
    }

    let (reports_tx, reports_rx) = mpsc::unbounded_channel();
    let supervisor = Supervisor::new(config.federation.to_link_settings(), reports_tx);
    let state = Arc::new(AppState::new(pool.clone(), supervisor.clone()));

    let status_writer = tokio::spawn(background::start_status_writer(pool.clone(), reports_rx));
    let (stop_tx, stop_rx) = watch::channel(false);
    let reconcile = tokio::spawn(background::start_reconcile_task(
        Arc::clone(&state),
        config.federation.reconcile_interval(),
        stop_rx,
    ));

    let addr = SocketAddr::new(config.server.host, config.server.port);
    tracing::info!(%addr, "starting fedlink server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");

    axum::serve(listener, app(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Stop reconciling before stopping links, or the next pass would
    // restart them.
    let _ = stop_tx.send(true);
    if let Err(e) = reconcile.await {
        tracing::error!(error = %e, "reconcile task panicked");
    }

    supervisor.shutdown().await;
    match background::flush_counters(&pool, &supervisor).await {
        Ok(count) => tracing::info!(count, "flushed link counters"),
        Err(e) => tracing::error!(error = %e, "failed to flush link counters at shutdown"),
    }

    // Dropping the last supervisor handles closes the report channel.
    drop(state);
    drop(supervisor);
    if tokio::time::timeout(STATUS_DRAIN_TIMEOUT, status_writer)
        .await
        .is_err()
    {
        tracing::warn!("status writer did not drain in time");
    }

    tracing::info!("fedlink server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
