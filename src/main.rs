//! Vault Sync Server
//!
//! Serves `POST /api/sync` over a vault directory on disk.

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vault_sync_server::config::Config;
use vault_sync_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "vault_sync_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting Vault Sync Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Vault: {}", config.vault.vault_path.display());
    tracing::info!("Buffer: {}", config.vault.buffer_path.display());
    tracing::info!(
        "Recognized suffixes: {}",
        config.sync.recognized_suffixes.join(", ")
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);

    let app_state = AppState::new(config)
        .await
        .context("Failed to prepare vault directories")?;

    let app = vault_sync_server::app(app_state);

    tracing::info!("Vault Sync Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
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
