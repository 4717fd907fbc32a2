use anyhow::Result;
use clap::Parser;
use tracing::info;

use farmhand::{telemetry, Farmer, FarmerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    info!("Starting farmhand");

    let config = FarmerConfig::parse();
    info!(
        "Configuration: bridge_url={}, pow_binary={}, stake_amount={}",
        config.bridge_url, config.pow_binary, config.stake_amount
    );

    let farmer = Farmer::initialize(config)?;
    farmer.run().await?;

    info!("Farmhand shutdown complete");
    Ok(())
}
