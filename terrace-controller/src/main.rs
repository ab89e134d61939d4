//! Terrace Controller
//!
//! Runs the deploy item timeout loop against a directory of deploy item
//! manifests until interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use terrace_controller::{Config, DeployItemController, DirDeployItemClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "terrace_controller=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Terrace Controller");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    info!(
        "Loaded configuration: deploy_items_dir={}, resync_interval={:?}",
        config.deploy_items_dir.display(),
        config.resync_interval
    );

    let client = Arc::new(DirDeployItemClient::new(config.deploy_items_dir.clone()));
    let controller = DeployItemController::new(client, &config);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown requested");
        shutdown.cancel();
    });

    controller.run(cancel).await;
    Ok(())
}
