//! `dockhand load` command implementation

use crate::image::archive::ImageArchive;
use crate::load::action::LoadAction;
use crate::load::loader;
use crate::load::reconcile::Reconciler;
use crate::store::DockerStore;
use clap::Args;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Arguments for the `load` command
#[derive(Args)]
pub struct LoadArgs {
    /// Path to the image archive (docker-save or OCI layout tar, optionally gzipped)
    pub archive: PathBuf,

    /// Repo tags ("name:tag") to bind to the image, in order
    #[arg(required = true)]
    pub tags: Vec<String>,

    /// Print the action ledger as JSON on stdout
    #[arg(long, value_parser = ["json"])]
    pub output: Option<String>,

    /// Deadline in seconds applied to every store call
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,
}

/// Execute the `load` command
pub async fn execute(args: LoadArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    let archive = ImageArchive::open(&args.archive)?;
    let desired = archive.desired_image(&args.tags);
    tracing::info!(digest = %desired.digest, "computed image ID");

    let store = DockerStore::connect(Duration::from_secs(args.timeout)).await?;
    let reconciler = Reconciler::new(&store);

    let action = match reconciler.find_existing(&desired).await? {
        Some(action) => action,
        None => {
            loader::load_archive(&store, archive.path()).await?;
            reconciler
                .ensure_tags(
                    LoadAction::new(&desired.digest),
                    &desired.digest,
                    &desired.repo_tags,
                )
                .await?
        }
    };
    let action = action.finalize(start.elapsed());

    report(&action, args.output.as_deref())?;
    Ok(())
}

/// Print human status lines, and the ledger itself when JSON was requested
fn report(action: &LoadAction, output: Option<&str>) -> anyhow::Result<()> {
    if action.already_loaded {
        eprintln!("Image ID {} was already loaded.", action.digest);
    }
    for tag in &action.tags_already_present {
        eprintln!("Image was already tagged with {}", tag);
    }
    for tag in &action.tags_added {
        eprintln!("Tagged image with {}", tag);
    }

    if output == Some("json") {
        println!("{}", action.to_json()?);
    }

    Ok(())
}
