//! fleetd daemon entry point.
//!
//! Settings come from the TOML file named by `FLEETD_SETTINGS`; the
//! topology is read from the first valid candidate in `config_paths`.

use fleetd::lifecycle::signals::wait_for_shutdown;
use fleetd::observability::logging;
use fleetd::{boot, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    logging::init(&settings.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fleetd starting");
    tracing::info!(
        config_paths = ?settings.config_paths,
        listen_host = %settings.listen_host,
        max_connections = settings.max_connections,
        fix_network = settings.fix_network,
        "Settings loaded"
    );

    let daemon = boot(&settings).await?;

    wait_for_shutdown().await;
    daemon.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
