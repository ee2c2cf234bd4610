//! HCI Transport - Main Entry Point
//!
//! Usage: `hci-transport [config.toml]`

use tracing::info;
use transport_daemon::{init_logging, load_config, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1);
    let config = load_config(path.as_deref())?;
    init_logging(&config.log_level)?;

    info!("=== HCI Transport v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Serial link {} at {} baud",
        config.link.device, config.link.baud_rate
    );

    let stats = run(config).await?;
    info!("Exiting after {} transfers", stats.transfers);
    Ok(())
}
