//! OCI image specification types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The desired state of one image in the store: its content address, the
/// config that defines its behavior, and the repo tags it should carry.
///
/// Constructed once per invocation from build input, immutable thereafter.
#[derive(Debug, Clone)]
pub struct DesiredImage {
    /// Content-addressed image ID ("sha256:<hex>" of the config blob)
    pub digest: String,
    /// Parsed OCI image configuration
    pub config: ImageConfig,
    /// Ordered list of "name:tag" references the image should be bound to
    pub repo_tags: Vec<String>,
}

/// OCI image configuration (the config blob referenced by the manifest)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub architecture: String,
    pub os: String,
    #[serde(default)]
    pub config: Option<ContainerConfig>,
}

/// Runtime configuration embedded in the image config.
///
/// Every field is optional: the OCI spec allows each to be absent, and the
/// distinction between absent and present-but-empty is kept here so the
/// comparison layer can decide how to normalize it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub env: Option<Vec<String>>,
    #[serde(default)]
    pub entrypoint: Option<Vec<String>>,
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

/// OCI image manifest (the blob an image index entry points at)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: i32,
    #[serde(default)]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// OCI content descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: i64,
}

/// OCI image index (index.json at the root of an OCI layout)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: i32,
    pub manifests: Vec<Descriptor>,
}
