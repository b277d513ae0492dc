//! Dockhand - idempotent image loading for build pipelines
//!
//! This crate loads a locally built container image archive into a Docker
//! daemon only when its content is not already present, reconciles repo
//! tags, and reports exactly which mutations were performed.

pub mod cli;
pub mod image;
pub mod load;
pub mod store;

use thiserror::Error;

/// Main error type for Dockhand operations
#[derive(Error, Debug)]
pub enum DockhandError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Invalid image archive: {0}")]
    InvalidArchive(String),

    #[error("Store error: {0}")]
    Store(#[from] bollard::errors::Error),

    #[error("Malformed store response: {0}")]
    MalformedResponse(String),

    #[error("Tagging failed: {0}")]
    Tag(String),

    #[error("Store rejected the image load: {0}")]
    LoadRejected(String),
}

pub type Result<T> = std::result::Result<T, DockhandError>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "dockhand";
