//! Reading locally built image archives
//!
//! Resolves the image config blob out of a `docker save`-format or
//! OCI-layout tar archive (optionally gzip-compressed) and derives the
//! content-addressed image ID from it.

use crate::image::oci::{DesiredImage, ImageConfig, ImageIndex, ImageManifest};
use crate::{DockhandError, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// One entry of the manifest.json inside a `docker save` archive
#[derive(Debug, Clone, Deserialize)]
struct SaveManifestEntry {
    #[serde(rename = "Config")]
    config: String,
}

/// An image archive on disk with its config blob resolved and hashed
#[derive(Debug)]
pub struct ImageArchive {
    path: PathBuf,
    digest: String,
    config: ImageConfig,
}

impl ImageArchive {
    /// Open an archive and resolve its config blob
    pub fn open(path: &Path) -> Result<Self> {
        let config_bytes = read_config_blob(path)?;
        let digest = format!("sha256:{:x}", Sha256::digest(&config_bytes));
        let config: ImageConfig = serde_json::from_slice(&config_bytes)?;

        Ok(Self {
            path: path.to_path_buf(),
            digest,
            config,
        })
    }

    /// Path of the archive file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content-addressed image ID ("sha256:<hex>" of the config blob)
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Parsed image configuration
    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Pair the archive contents with the repo tags the caller wants bound
    pub fn desired_image(&self, repo_tags: &[String]) -> DesiredImage {
        DesiredImage {
            digest: self.digest.clone(),
            config: self.config.clone(),
            repo_tags: repo_tags.to_vec(),
        }
    }
}

/// Locate the config blob in either archive format.
///
/// `docker save` archives carry a top-level manifest.json whose entries name
/// the config member directly; OCI layouts go index.json -> manifest blob ->
/// config blob.
fn read_config_blob(path: &Path) -> Result<Vec<u8>> {
    if let Some(manifest) = read_entry(path, "manifest.json")? {
        let entries: Vec<SaveManifestEntry> = serde_json::from_slice(&manifest)?;
        let entry = entries.into_iter().next().ok_or_else(|| {
            DockhandError::InvalidArchive("manifest.json has no entries".to_string())
        })?;
        return read_entry(path, &entry.config)?.ok_or_else(|| {
            DockhandError::InvalidArchive(format!(
                "config member {} missing from archive",
                entry.config
            ))
        });
    }

    if let Some(index) = read_entry(path, "index.json")? {
        let index: ImageIndex = serde_json::from_slice(&index)?;
        let descriptor = index.manifests.first().ok_or_else(|| {
            DockhandError::InvalidArchive("index.json lists no manifests".to_string())
        })?;
        let manifest_bytes = read_blob(path, &descriptor.digest)?;
        let manifest: ImageManifest = serde_json::from_slice(&manifest_bytes)?;
        return read_blob(path, &manifest.config.digest);
    }

    Err(DockhandError::InvalidArchive(
        "archive contains neither manifest.json nor index.json".to_string(),
    ))
}

/// Read a blob from the OCI layout blobs/ directory inside the archive
fn read_blob(path: &Path, digest: &str) -> Result<Vec<u8>> {
    let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
    let member = format!("blobs/sha256/{}", hex);
    read_entry(path, &member)?.ok_or_else(|| {
        DockhandError::InvalidArchive(format!("blob {} missing from archive", digest))
    })
}

/// Walk the archive and return the contents of the named entry, if present.
///
/// The archive is re-opened per lookup: tar only supports sequential reads,
/// and the members we want are small next to the layers we skip over.
fn read_entry(path: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let mut file = File::open(path)?;

    // Check if it's gzipped
    let mut magic = [0u8; 2];
    let gzipped = match file.read_exact(&mut magic) {
        Ok(()) => magic == [0x1f, 0x8b],
        Err(_) => false,
    };

    // Reopen the file
    let file = File::open(path)?;

    if gzipped {
        let decoder = flate2::read::GzDecoder::new(file);
        scan_entries(tar::Archive::new(decoder), name)
    } else {
        scan_entries(tar::Archive::new(file), name)
    }
}

fn scan_entries<R: Read>(mut archive: tar::Archive<R>, name: &str) -> Result<Option<Vec<u8>>> {
    let wanted = Path::new(name);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let matches = {
            let entry_path = entry.path()?;
            entry_path == wanted
                || entry_path
                    .strip_prefix(".")
                    .map(|stripped| stripped == wanted)
                    .unwrap_or(false)
        };
        if matches {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            return Ok(Some(data));
        }
    }

    Ok(None)
}
