//! The record of mutations performed during one reconciliation

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Summary of what one load request actually had to do.
///
/// The image may have been present already, and some tags may have been
/// bound already; downstream build steps consume this record to decide
/// whether anything changed. Built up during reconciliation, stamped with
/// the elapsed time on finalize, and never mutated after being returned.
///
/// Whenever `already_loaded` is true, `tags_added` and
/// `tags_already_present` are disjoint and together cover the desired tag
/// set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAction {
    pub digest: String,
    pub already_loaded: bool,
    pub tags_added: Vec<String>,
    pub tags_already_present: Vec<String>,
    pub load_time: String,
}

impl LoadAction {
    /// Start a ledger for the given digest
    pub fn new(digest: &str) -> Self {
        Self {
            digest: digest.to_string(),
            ..Default::default()
        }
    }

    /// Mark the image as already present in the store
    pub fn already_loaded(mut self) -> Self {
        self.already_loaded = true;
        self
    }

    /// Stamp the elapsed time and return the final ledger
    pub fn finalize(mut self, elapsed: Duration) -> Self {
        self.load_time = format!("{:?}", elapsed);
        self
    }

    /// Compact JSON representation with stable field names
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names_are_stable() {
        let action = LoadAction {
            digest: "sha256:aaa".to_string(),
            already_loaded: true,
            tags_added: vec!["app:v2".to_string()],
            tags_already_present: vec!["app:v1".to_string()],
            load_time: "12ms".to_string(),
        };

        let value: serde_json::Value =
            serde_json::from_str(&action.to_json().unwrap()).unwrap();
        assert_eq!(value["digest"], "sha256:aaa");
        assert_eq!(value["alreadyLoaded"], true);
        assert_eq!(value["tagsAdded"][0], "app:v2");
        assert_eq!(value["tagsAlreadyPresent"][0], "app:v1");
        assert_eq!(value["loadTime"], "12ms");
    }

    #[test]
    fn test_finalize_stamps_elapsed_time() {
        let action = LoadAction::new("sha256:aaa").finalize(Duration::from_millis(1500));
        assert_eq!(action.load_time, "1.5s");
    }

    #[test]
    fn test_new_ledger_is_empty() {
        let action = LoadAction::new("sha256:aaa");
        assert!(!action.already_loaded);
        assert!(action.tags_added.is_empty());
        assert!(action.tags_already_present.is_empty());
    }
}
