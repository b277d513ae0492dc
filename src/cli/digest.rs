//! `dockhand digest` command implementation

use crate::image::archive::ImageArchive;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the `digest` command
#[derive(Args)]
pub struct DigestArgs {
    /// Path to the image archive
    pub archive: PathBuf,
}

/// Execute the `digest` command
pub async fn execute(args: DigestArgs) -> anyhow::Result<()> {
    let archive = ImageArchive::open(&args.archive)?;
    println!("{}", archive.digest());
    Ok(())
}
