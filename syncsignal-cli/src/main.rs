use anyhow::Result;
use clap::Parser;
use syncsignal_cli::{load_config, run, Cli};
use syncsignal_core::logging::init_logging_with_config;
use syncsignal_core::metrics::init_metrics;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging_with_config(config.logging.to_log_config()?)?;
    init_metrics();
    debug!(?config, "Loaded configuration");

    let mut stdout = std::io::stdout();
    run(&cli, &config, &mut stdout).await?;

    info!("syncsignal finished");
    Ok(())
}
