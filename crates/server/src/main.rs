use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use acquirer_core::{load_config, validate_config, AcquisitionCoordinator};
use acquirer_server::{api::create_router, metrics::REGISTRY, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting acquirer v{}", VERSION);

    // Determine config path
    let config_path = std::env::var("ACQUIRER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    // Config fingerprint
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(fingerprint = &config_hash[..16], "Configuration loaded successfully");

    match &config.indexer {
        Some(indexer) => info!(url = %indexer.url, "Indexer configured"),
        None => warn!("No indexer configured; automatic discovery disabled"),
    }
    match &config.torrent_client {
        Some(tc) => info!(backend = ?tc.backend, category = %tc.category, "Torrent client configured"),
        None => warn!("No torrent client configured; acquisition disabled"),
    }
    if config.library.roots.is_empty() {
        warn!("No library roots configured; completed downloads stay in the daemon");
    }

    let coordinator = Arc::new(
        AcquisitionCoordinator::from_config(&config)
            .context("Failed to create acquisition coordinator")?,
    );

    // Force metric registration before the first scrape
    once_cell::sync::Lazy::force(&REGISTRY);

    if config.acquisition.enabled {
        coordinator.start();
    } else {
        info!("Periodic acquisition disabled in config");
    }

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&coordinator)));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if coordinator.is_scheduled() {
        coordinator.stop();
        info!("Acquisition scheduler stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
