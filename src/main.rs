//! Harbortown World Server
//!
//! Runs the shared world behind a WebSocket server until Ctrl-C.

use std::sync::Arc;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use harbortown::{
    network::{GameServer, ServerConfig},
    TICK_RATE, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Harbortown Server v{}", VERSION);
    info!("Client tick rate: {} Hz", TICK_RATE);

    let config = ServerConfig::from_env().context("reading HARBORTOWN_* environment")?;
    if let Some(path) = &config.world_config_path {
        info!("World config: {}", path.display());
    }

    let server = Arc::new(GameServer::new(config).context("starting world")?);
    {
        let world = server.world();
        let snapshot = world.snapshot_now().await;
        info!(
            "World ready: {} zones, {} trees, {} properties, seed {}",
            world.zones().zones().count(),
            snapshot.trees.len(),
            snapshot.properties.len(),
            world.config().seed,
        );
    }

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
