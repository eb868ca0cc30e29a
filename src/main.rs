//! mpdlink - watch an MPD server and log its idle notifications.

use mpdlink::{bus, config, watcher};

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mpdlink=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting mpdlink v{} ({})",
        env!("MPDLINK_VERSION"),
        env!("MPDLINK_GIT_SHA")
    );

    // Load configuration
    let config = config::load_config().context("loading configuration")?;
    tracing::info!("Configuration loaded, server: {}", config.address());

    // Create event bus
    let bus = bus::create_bus();
    let mut events = bus.subscribe();

    let shutdown = CancellationToken::new();
    let retry = watcher::RetryConfig::from(&config.retry);
    let mpd_watcher = watcher::MpdWatcher::new(config, bus.clone(), shutdown.clone());
    let watcher_task = tokio::spawn(mpd_watcher.run(retry));

    // Log bus events until the watcher stops
    let logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => tracing::info!("event: {}", json),
                Err(e) => tracing::warn!("Failed to serialize event {:?}: {}", event, e),
            }
            if event == bus::BusEvent::WatcherStopped {
                break;
            }
        }
    });

    shutdown_signal().await;
    shutdown.cancel();

    tracing::info!("Stopping watcher...");
    watcher_task.await.context("watcher task panicked")?;
    let _ = logger.await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
