//! Swarm Warden main binary

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use swarm_warden::config::WardenConfig;
use swarm_warden::error::WardenError;
use swarm_warden::http::StatusServer;
use swarm_warden::scheduler::WardenScheduler;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("SWARM_LOG_LEVEL")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Swarm Warden v{}", swarm_warden::WARDEN_VERSION);

    // Load configuration
    let config = load_config()?;
    info!(
        "Using the following configuration:\n{}",
        serde_json::to_string_pretty(&config)?
    );

    // Create the warden and its job set
    let warden = Arc::new(swarm_warden::init_warden(config.clone()).await?);
    let scheduler = Arc::new(WardenScheduler::new(&config, warden.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the status server
    let addr: SocketAddr = config.listen_addr.parse()?;
    let server = StatusServer::new(warden.clone(), scheduler.clone());
    let server_handle = tokio::spawn(server.serve(addr, shutdown_rx.clone()));

    // Translate process signals into the shutdown channel
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // One early convergence attempt; the engine needs a moment after boot
    // before its membership answers settle.
    tokio::time::sleep(Duration::from_secs(
        swarm_warden::STARTUP_CONVERGENCE_DELAY_SECS,
    ))
    .await;
    if let Err(e) = warden.assume_role().await {
        warn!("Failed to assume the desired role at startup: {}", e);
    }

    // Run the scheduler loop until shutdown
    scheduler.run(shutdown_rx).await?;

    if let Err(e) = server_handle.await? {
        error!("Status server error: {}", e);
    }

    info!("Swarm Warden shutdown completed");
    Ok(())
}

/// Load configuration from environment variables or a config file
fn load_config() -> Result<WardenConfig, WardenError> {
    // Environment variables win when present
    if std::env::var("SWARM_REGISTRY").is_ok() {
        return WardenConfig::from_env();
    }

    // Fall back to a TOML file when one is configured
    if let Ok(config_path) = std::env::var("SWARM_CONFIG_PATH") {
        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            WardenError::Configuration(format!("cannot read config file {config_path}: {e}"))
        })?;
        return WardenConfig::from_toml(&content);
    }

    Err(WardenError::Configuration(
        "SWARM_REGISTRY is not set and no SWARM_CONFIG_PATH was given".to_string(),
    ))
}

/// Handle shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }

    info!("Shutdown signal received");
}
