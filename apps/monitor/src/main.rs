mod config;
mod main_lib;
mod upstream;

use config::Config;
use main_lib::{build_monitor, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let monitor = build_monitor(&config).await?;

    tracing::info!(
        "Monitoring {} upstream(s) as '{}'; press Ctrl-C to stop",
        monitor.proxies.len(),
        config.source_type
    );
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    monitor.shutdown().await;
    Ok(())
}
