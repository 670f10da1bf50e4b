/// Chatlink hub - Main entry point
use chatlink_core::{Config, Hub};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Create and start the hub
    let hub = Hub::new(config)
        .map_err(|e| anyhow::anyhow!("Startup error: {}", e))?;
    info!("Starting Chatlink hub");

    // Blocks until shutdown
    hub.start().await
        .map_err(|e| anyhow::anyhow!("Hub error: {}", e))?;

    Ok(())
}
