//! Safety Monitoring Pipeline - Main Entry Point

use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!("=== SiteWatch Safety Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Starting rule evaluation and alert pipeline...");

    let config = AppConfig::load()?;
    run_server(config).await?;

    Ok(())
}
