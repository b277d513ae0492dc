//! Image store capability surface
//!
//! The mutable image store (a Docker daemon in production) is modeled as a
//! small trait so the reconciliation engine can run against the real daemon
//! or a deterministic in-memory store in tests.

pub mod docker;
pub mod memory;

use crate::image::oci::ContainerConfig;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use docker::DockerStore;
pub use memory::MemoryStore;

/// The store's view of one image.
///
/// Fetched on demand and never cached across calls: the store is shared
/// mutable state that other processes may modify concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Image ID as the store reports it ("sha256:<hex>")
    pub id: String,
    pub architecture: String,
    pub os: String,
    /// Store-reported runtime configuration
    pub config: ContainerConfig,
    /// Repo tags currently bound to the image
    pub repo_tags: Vec<String>,
}

/// One structured message from the store's load-archive response body.
///
/// The store signals load failure inside the response body rather than at
/// the transport level, so both channels are surfaced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadMessage {
    /// Progress text, when the store reported any
    pub stream: Option<String>,
    /// Embedded error message; non-empty means the load failed
    pub error: Option<String>,
}

impl LoadMessage {
    /// The embedded error message, if the store reported one
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|message| !message.is_empty())
    }
}

/// Capability set the reconciliation engine consumes
#[async_trait]
pub trait ImageStore {
    /// Look up an image by reference (ID, digest, or "name:tag").
    ///
    /// A missing image is `Ok(None)`: not-found drives phase branching and
    /// is never a failure. Any transport-level problem is an error.
    async fn inspect(&self, reference: &str) -> Result<Option<ImageDescriptor>>;

    /// All images currently in the store
    async fn list(&self) -> Result<Vec<ImageDescriptor>>;

    /// Bind a "name:tag" reference to the image with the given ID
    async fn tag(&self, image_id: &str, tag: &str) -> Result<()>;

    /// Stream an archive into the store and return the full response body.
    ///
    /// Transport failures are errors; the returned messages may still carry
    /// an embedded failure that the caller must check for.
    async fn load_archive(&self, archive: &Path) -> Result<Vec<LoadMessage>>;
}
