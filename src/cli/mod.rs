//! CLI command definitions and handlers

pub mod digest;
pub mod load;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dockhand - idempotent image loading for build pipelines
#[derive(Parser)]
#[command(name = "dockhand")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Load an image archive into the store, skipping work already done
    Load(load::LoadArgs),

    /// Print the content-addressed image ID of an archive
    Digest(digest::DigestArgs),
}
