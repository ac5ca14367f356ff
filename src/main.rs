//! Braid Mock Server
//!
//! Serves mock resource files over the Braid subscription protocol and
//! pushes patches to subscribers whenever a file changes on disk.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use braid_mock_server::config::Config;
use braid_mock_server::pipeline::{ChangePipeline, FsWatcher, CHANGE_QUEUE_CAPACITY};
use braid_mock_server::routes;
use braid_mock_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "braid_mock_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Braid mock server v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::new(config.clone()).context("Failed to initialize application state")?;
    tracing::info!(
        "Serving .{} files from {}",
        state.store().extension(),
        state.store().root().display()
    );

    // Watch the resource directory and feed changes to the dispatcher
    let (tx, rx) = mpsc::channel(CHANGE_QUEUE_CAPACITY);
    let _watcher = FsWatcher::start(state.store().root(), tx)
        .context("Failed to watch resource directory")?;
    let pipeline = ChangePipeline::new(state.store().clone(), Arc::new(state.dispatcher().clone()))
        .with_gate(state.change_gate().clone())
        .with_settle_delay(config.watch.settle)
        .spawn(rx);

    let app = routes::router(state.clone());

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;
    tracing::info!("Braid mock server listening on {}", listener.local_addr()?);

    // Open subscription streams end once shutdown starts, letting connections drain
    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_state.shutdown();
        })
        .await
        .context("Server error")?;

    pipeline.abort();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
