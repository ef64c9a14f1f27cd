//! Command line front end: normalizes provider exports and writes the merged mobility reports.

mod config;
mod files;
mod logging;
mod pipeline;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use reqwest::Client;
use tracing::info;

use crate::config::Config;
use crate::pipeline::{run_all, run_apple, run_google, run_merge, run_tomtom, run_waze};

#[derive(Parser)]
#[command(name = "mobility", version, about = "Build canonical mobility reports")]
struct Cli {
    /// Configuration file.
    #[arg(long, default_value = "mobility.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the Google reports, including the configured detailed slices.
    Google,
    /// Build the Apple reports.
    Apple,
    /// Build the Waze report.
    Waze,
    /// Refresh the TomTom history when new data is published.
    Tomtom {
        /// Download even if the reference city shows no new day.
        #[arg(long)]
        force: bool,
    },
    /// Build Google and Apple reports and merge them into the summary reports.
    Merge,
    /// Run every provider, then merge.
    All {
        /// Download TomTom data even if the reference city shows no new day.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    info!(config = %cli.config.display(), "Loaded configuration");

    let client = Client::builder()
        .user_agent(concat!("mobility/", env!("CARGO_PKG_VERSION")))
        .build()?;

    match cli.command {
        Command::Google => run_google(&config).map(drop),
        Command::Apple => run_apple(&config).map(drop),
        Command::Waze => run_waze(&config),
        Command::Tomtom { force } => run_tomtom(&config, client, force).await,
        Command::Merge => {
            let google = run_google(&config)?;
            let apple = run_apple(&config)?;
            run_merge(&config, google, apple)
        }
        Command::All { force } => run_all(&config, client, force).await,
    }
}
