use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ffcal::cli::Cli;
use ffcal::config::Config;
use ffcal::dispatcher::dispatch_command;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = Config::load(cli.config.as_deref())?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    dispatch_command(cli, config).await
}
