mod api;
mod config;
mod service;
mod sniffing;
mod store;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::service::PacketService;
use crate::sniffing::PacketSniffer;
use crate::store::PacketStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("packet_snifferd=info"))
        )
        .init();

    tracing::info!("Starting packet-snifferd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "packet-sniffer.toml".to_string());

    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    config.apply_env();
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        "Configuration: max_size={}, interval={:?}, listen={}, shutdown_timeout={:?}",
        config.storage.max_size,
        config.sniffing.interval(),
        config.api.listen,
        config.api.shutdown_timeout()
    );

    let store = Arc::new(PacketStore::new(config.storage.max_size));
    tracing::info!("Packet store ready (capacity {})", store.capacity());
    let sniffer = Arc::new(PacketSniffer::new(store.clone(), config.sniffing.interval()));

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    let service = PacketService::new(store.clone(), sniffer, cancel.clone());

    if config.sniffing.autostart {
        service.start_sniffing()?;
    }

    let app = api::routes::router(api::routes::AppState {
        service: service.clone(),
    });

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    shutdown_signal().await?;
    tracing::info!("Shutdown signal received");

    if let Err(e) = service.stop_sniffing().await {
        tracing::error!("Failed to stop packet sniffer: {:#}", e);
    }

    // Trigger cancellation
    cancel.cancel();

    let timeout = config.api.shutdown_timeout();
    if tokio::time::timeout(timeout, server_handle).await.is_err() {
        tracing::warn!("Server did not drain within {:?}", timeout);
    }

    if !store.is_empty() {
        tracing::info!("Discarding {} buffered packets", store.len());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())
            .context("Failed to listen for SIGTERM")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    Ok(())
}
