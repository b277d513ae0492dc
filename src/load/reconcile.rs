//! Two-phase existence check and tag reconciliation

use crate::image::oci::DesiredImage;
use crate::load::action::LoadAction;
use crate::load::compare::configs_equal;
use crate::store::ImageStore;
use crate::{DockhandError, Result};
use tracing::{debug, info};

/// Reconciles one desired image against the store.
///
/// The engine only reads and tags; actually loading an archive is the
/// caller's job, taken on when `find_existing` reports that nothing in the
/// store matches.
pub struct Reconciler<'a, S: ImageStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ImageStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Two-phase existence check.
    ///
    /// Phase A probes by the desired digest. Phase B probes by the first
    /// desired tag and accepts the stored image when its config is
    /// semantically identical even though the digests differ: a rebuilt
    /// image can be behaviorally identical while carrying a different
    /// digest. Returns the reconciled ledger when a match is found, `None`
    /// when the caller must perform a full load.
    pub async fn find_existing(&self, desired: &DesiredImage) -> Result<Option<LoadAction>> {
        let action = LoadAction::new(&desired.digest);

        // Phase A: strict ID probe
        debug!(digest = %desired.digest, "probing store by image ID");
        if self.store.inspect(&desired.digest).await?.is_some() {
            info!(digest = %desired.digest, "image already present");
            let action = self
                .ensure_tags(action.already_loaded(), &desired.digest, &desired.repo_tags)
                .await?;
            return Ok(Some(action));
        }

        // Phase B: loose probe via the first desired tag
        let Some(first_tag) = desired.repo_tags.first() else {
            return Ok(None);
        };
        debug!(tag = %first_tag, "probing store by tag");
        if let Some(descriptor) = self.store.inspect(first_tag).await? {
            if configs_equal(&desired.config, &descriptor) {
                info!(
                    id = %descriptor.id,
                    "existing image matches desired config, digest mismatch ignored"
                );
                let action = self
                    .ensure_tags(action.already_loaded(), &descriptor.id, &desired.repo_tags)
                    .await?;
                return Ok(Some(action));
            }
            debug!(tag = %first_tag, "existing image found but config differs");
        }

        Ok(None)
    }

    /// Tag reconciliation.
    ///
    /// Re-reads the image's authoritative current tag set (a descriptor
    /// obtained earlier may be stale), then partitions the desired tags:
    /// present ones are recorded, missing ones applied one at a time in
    /// input order. A tag failure aborts immediately; the partial ledger
    /// must then be discarded by the caller. Duplicate desired tags are
    /// classified against the same snapshot and may appear more than once.
    pub async fn ensure_tags(
        &self,
        action: LoadAction,
        image_id: &str,
        repo_tags: &[String],
    ) -> Result<LoadAction> {
        let descriptor = self
            .store
            .inspect(image_id)
            .await?
            .ok_or_else(|| DockhandError::ImageNotFound(image_id.to_string()))?;

        let mut action = action;
        for tag in repo_tags {
            if descriptor.repo_tags.iter().any(|t| t == tag) {
                debug!(tag = %tag, "tag already present");
                action.tags_already_present.push(tag.clone());
            } else {
                self.store.tag(image_id, tag).await?;
                info!(id = %image_id, tag = %tag, "tagged image");
                action.tags_added.push(tag.clone());
            }
        }

        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::oci::{ContainerConfig, ImageConfig};
    use crate::load::loader;
    use crate::store::{ImageDescriptor, MemoryStore};
    use std::collections::HashMap;
    use std::collections::HashSet;
    use std::path::Path;

    fn config() -> ImageConfig {
        ImageConfig {
            architecture: "amd64".to_string(),
            os: "linux".to_string(),
            config: Some(ContainerConfig {
                user: None,
                env: Some(vec!["PATH=/usr/bin".to_string()]),
                entrypoint: Some(vec!["/entry".to_string()]),
                cmd: Some(vec!["serve".to_string()]),
                working_dir: None,
                labels: None,
            }),
        }
    }

    fn desired(digest: &str, tags: &[&str]) -> DesiredImage {
        DesiredImage {
            digest: digest.to_string(),
            config: config(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn stored(id: &str, tags: &[&str]) -> ImageDescriptor {
        let config = config();
        ImageDescriptor {
            id: id.to_string(),
            architecture: config.architecture.clone(),
            os: config.os.clone(),
            config: config.config.unwrap_or_default(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Run the full load workflow the way the CLI does: check, then load
    /// and tag when nothing matched.
    async fn check_load_tag(store: &MemoryStore, desired: &DesiredImage) -> LoadAction {
        let reconciler = Reconciler::new(store);
        match reconciler.find_existing(desired).await.unwrap() {
            Some(action) => action,
            None => {
                loader::load_archive(store, Path::new("image.tar"))
                    .await
                    .unwrap();
                reconciler
                    .ensure_tags(
                        LoadAction::new(&desired.digest),
                        &desired.digest,
                        &desired.repo_tags,
                    )
                    .await
                    .unwrap()
            }
        }
    }

    #[tokio::test]
    async fn test_empty_store_loads_and_tags() {
        let store = MemoryStore::new();
        store.stage_archive(stored("sha256:aaa", &[]));
        let desired = desired("sha256:aaa", &["app:v1"]);

        let action = check_load_tag(&store, &desired).await;

        assert_eq!(action.digest, "sha256:aaa");
        assert!(!action.already_loaded);
        assert_eq!(action.tags_added, vec!["app:v1".to_string()]);
        assert!(action.tags_already_present.is_empty());
        assert_eq!(store.loads(), 1);
        assert_eq!(store.tags_of("sha256:aaa"), vec!["app:v1".to_string()]);
    }

    #[tokio::test]
    async fn test_strict_match_skips_load() {
        let store = MemoryStore::new();
        store.insert(stored("sha256:aaa", &["app:v1"]));
        let desired = desired("sha256:aaa", &["app:v1"]);

        let action = check_load_tag(&store, &desired).await;

        assert!(action.already_loaded);
        assert!(action.tags_added.is_empty());
        assert_eq!(action.tags_already_present, vec!["app:v1".to_string()]);
        assert_eq!(store.loads(), 0);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let store = MemoryStore::new();
        store.stage_archive(stored("sha256:aaa", &[]));
        let desired = desired("sha256:aaa", &["app:v1"]);

        let first = check_load_tag(&store, &desired).await;
        assert!(!first.already_loaded);

        let second = check_load_tag(&store, &desired).await;
        assert!(second.already_loaded);
        assert!(second.tags_added.is_empty());
        assert_eq!(second.tags_already_present, vec!["app:v1".to_string()]);
        assert_eq!(store.loads(), 1);
    }

    #[tokio::test]
    async fn test_loose_match_accepts_rebuilt_image() {
        // Same behavior, different digest: the store's copy wins
        let store = MemoryStore::new();
        store.insert(stored("sha256:bbb", &["app:v1"]));
        let desired = desired("sha256:aaa", &["app:v1"]);

        let reconciler = Reconciler::new(&store);
        let action = reconciler.find_existing(&desired).await.unwrap().unwrap();

        assert!(action.already_loaded);
        assert_eq!(action.digest, "sha256:aaa");
        assert_eq!(action.tags_already_present, vec!["app:v1".to_string()]);
        assert_eq!(store.loads(), 0);
    }

    #[tokio::test]
    async fn test_loose_match_tags_target_the_resolved_image() {
        let store = MemoryStore::new();
        store.insert(stored("sha256:bbb", &["app:v1"]));
        let desired = desired("sha256:aaa", &["app:v1", "app:latest"]);

        let reconciler = Reconciler::new(&store);
        let action = reconciler.find_existing(&desired).await.unwrap().unwrap();

        assert_eq!(action.tags_added, vec!["app:latest".to_string()]);
        assert_eq!(
            store.tags_of("sha256:bbb"),
            vec!["app:v1".to_string(), "app:latest".to_string()]
        );
    }

    #[tokio::test]
    async fn test_loose_match_rejects_extra_label() {
        let store = MemoryStore::new();
        let mut image = stored("sha256:bbb", &["app:v1"]);
        image.config.labels = Some(HashMap::from([(
            "build".to_string(),
            "123".to_string(),
        )]));
        store.insert(image);
        let desired = desired("sha256:aaa", &["app:v1"]);

        let reconciler = Reconciler::new(&store);
        assert!(reconciler.find_existing(&desired).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_loose_match_rejects_differing_cmd() {
        let store = MemoryStore::new();
        let mut image = stored("sha256:bbb", &["app:v1"]);
        image.config.cmd = Some(vec!["debug".to_string()]);
        store.insert(image);
        let desired = desired("sha256:aaa", &["app:v1"]);

        let reconciler = Reconciler::new(&store);
        assert!(reconciler.find_existing(&desired).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_tags_means_no_loose_probe() {
        let store = MemoryStore::new();
        store.insert(stored("sha256:bbb", &["app:v1"]));
        let desired = desired("sha256:aaa", &[]);

        let reconciler = Reconciler::new(&store);
        assert!(reconciler.find_existing(&desired).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_id_match_adds_missing_tags_in_order() {
        let store = MemoryStore::new();
        store.insert(stored("sha256:aaa", &["app:v1"]));
        let desired = desired("sha256:aaa", &["app:v1", "app:v2"]);

        let reconciler = Reconciler::new(&store);
        let action = reconciler.find_existing(&desired).await.unwrap().unwrap();

        assert!(action.already_loaded);
        assert_eq!(action.tags_already_present, vec!["app:v1".to_string()]);
        assert_eq!(action.tags_added, vec!["app:v2".to_string()]);
    }

    #[tokio::test]
    async fn test_partition_invariant_holds() {
        let store = MemoryStore::new();
        store.insert(stored("sha256:aaa", &["app:v1", "app:v3"]));
        let desired = desired("sha256:aaa", &["app:v1", "app:v2", "app:v3", "app:v4"]);

        let reconciler = Reconciler::new(&store);
        let action = reconciler.find_existing(&desired).await.unwrap().unwrap();

        let added: HashSet<_> = action.tags_added.iter().collect();
        let present: HashSet<_> = action.tags_already_present.iter().collect();
        assert!(added.is_disjoint(&present));

        let union: HashSet<_> = added.union(&present).collect();
        let wanted: HashSet<_> = desired.repo_tags.iter().collect();
        assert_eq!(union.len(), wanted.len());
        assert!(wanted.iter().all(|t| union.contains(t)));
    }

    #[tokio::test]
    async fn test_duplicate_tags_are_classified_independently() {
        let store = MemoryStore::new();
        store.insert(stored("sha256:aaa", &[]));
        let desired = desired("sha256:aaa", &["app:v1", "app:v1"]);

        let reconciler = Reconciler::new(&store);
        let action = reconciler.find_existing(&desired).await.unwrap().unwrap();

        // Both occurrences were missing from the snapshot, so both were applied
        assert_eq!(
            action.tags_added,
            vec!["app:v1".to_string(), "app:v1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_tag_failure_aborts_reconciliation() {
        let store = MemoryStore::new();
        store.insert(stored("sha256:aaa", &[]));
        store.fail_tag("app:v2");
        let desired = desired("sha256:aaa", &["app:v1", "app:v2", "app:v3"]);

        let reconciler = Reconciler::new(&store);
        let err = reconciler.find_existing(&desired).await.unwrap_err();
        assert!(matches!(err, DockhandError::Tag(_)));

        // The tag before the failure went through; the one after did not
        assert_eq!(store.tags_of("sha256:aaa"), vec!["app:v1".to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_tags_on_missing_image_fails() {
        let store = MemoryStore::new();
        let reconciler = Reconciler::new(&store);

        let err = reconciler
            .ensure_tags(
                LoadAction::new("sha256:aaa"),
                "sha256:aaa",
                &["app:v1".to_string()],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DockhandError::ImageNotFound(_)));
    }

    #[tokio::test]
    async fn test_full_load_with_no_tags_is_degenerate_success() {
        let store = MemoryStore::new();
        store.stage_archive(stored("sha256:aaa", &[]));
        let desired = desired("sha256:aaa", &[]);

        let action = check_load_tag(&store, &desired).await;

        assert!(!action.already_loaded);
        assert!(action.tags_added.is_empty());
        assert!(action.tags_already_present.is_empty());
        assert_eq!(store.loads(), 1);
    }
}
