//! price-checker - scrapes product prices and appends them to CSV files and Google Sheets.

use anyhow::Result;
use clap::Parser;
use price_checker::commands::CheckCommand;
use price_checker::config::Config;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "price-checker",
    version,
    about = "Scrapes product prices and appends them to CSV files and Google Sheets"
)]
struct Cli {
    /// Config file to be used
    #[arg(short, long, env = "PRICE_CHECKER_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let config = Config::from_file(&cli.config)?;

    // Exporter failures are logged inside the run and do not change the exit code
    CheckCommand::new(config).execute().await?;

    Ok(())
}
