//! Hotpin Node binary
//!
//! Keeps a Kubo node pinned to the current hot dataset.

use hotpin_node::{HotpinConfig, HotpinNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hotpin_node=info,hotpin_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Hotpin Node");

    let config = HotpinConfig::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        e
    })?;

    let node = HotpinNode::new(config).map_err(|e| {
        tracing::error!("Startup failed: {}", e);
        e
    })?;
    node.run().await?;

    Ok(())
}
