//! Deterministic in-memory image store
//!
//! Used by the engine tests in place of a live daemon. Descriptors can be
//! seeded, an archive's contents staged, and tag failures injected; a load
//! counter lets tests assert that no load happened at all.

use crate::store::{ImageDescriptor, ImageStore, LoadMessage};
use crate::{DockhandError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// In-memory image store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    images: Vec<ImageDescriptor>,
    staged: Option<ImageDescriptor>,
    load_messages: Vec<LoadMessage>,
    failing_tags: Vec<String>,
    loads: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an image as already present in the store
    pub fn insert(&self, descriptor: ImageDescriptor) {
        self.lock().images.push(descriptor);
    }

    /// Stage the image that the next successful load will bring in
    pub fn stage_archive(&self, descriptor: ImageDescriptor) {
        self.lock().staged = Some(descriptor);
    }

    /// Make load responses carry the given messages instead of loading
    pub fn stage_load_messages(&self, messages: Vec<LoadMessage>) {
        self.lock().load_messages = messages;
    }

    /// Inject a failure for a specific tag
    pub fn fail_tag(&self, tag: &str) {
        self.lock().failing_tags.push(tag.to_string());
    }

    /// Number of load-archive invocations so far
    pub fn loads(&self) -> usize {
        self.lock().loads
    }

    /// Current repo tags of the image with the given ID
    pub fn tags_of(&self, id: &str) -> Vec<String> {
        self.lock()
            .images
            .iter()
            .find(|image| image.id == id)
            .map(|image| image.repo_tags.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn inspect(&self, reference: &str) -> Result<Option<ImageDescriptor>> {
        let inner = self.lock();
        let found = inner
            .images
            .iter()
            .find(|image| image.id == reference || image.repo_tags.iter().any(|t| t == reference));
        Ok(found.cloned())
    }

    async fn list(&self) -> Result<Vec<ImageDescriptor>> {
        Ok(self.lock().images.clone())
    }

    async fn tag(&self, image_id: &str, tag: &str) -> Result<()> {
        let mut inner = self.lock();

        if inner.failing_tags.iter().any(|t| t == tag) {
            return Err(DockhandError::Tag(format!("{}: injected failure", tag)));
        }

        // A tag names at most one image; move it like the daemon would
        for image in &mut inner.images {
            image.repo_tags.retain(|t| t != tag);
        }

        let image = inner
            .images
            .iter_mut()
            .find(|image| image.id == image_id)
            .ok_or_else(|| DockhandError::ImageNotFound(image_id.to_string()))?;
        image.repo_tags.push(tag.to_string());

        Ok(())
    }

    async fn load_archive(&self, _archive: &Path) -> Result<Vec<LoadMessage>> {
        let mut inner = self.lock();
        inner.loads += 1;

        if !inner.load_messages.is_empty() {
            return Ok(inner.load_messages.clone());
        }

        let mut messages = Vec::new();
        if let Some(image) = inner.staged.take() {
            messages.push(LoadMessage {
                stream: Some(format!("Loaded image ID: {}", image.id)),
                error: None,
            });
            inner.images.push(image);
        }

        Ok(messages)
    }
}
