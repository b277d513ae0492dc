//! Dockhand CLI entry point
//!
//! Loads locally built image archives into a Docker daemon idempotently.

use clap::Parser;
use dockhand::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging, optionally into a file for build-system capture
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    match cli.command {
        Commands::Load(args) => dockhand::cli::load::execute(args).await,
        Commands::Digest(args) => dockhand::cli::digest::execute(args).await,
    }
}
