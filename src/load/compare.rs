//! Semantic comparison of a desired config against a stored image

use crate::image::oci::{ContainerConfig, ImageConfig};
use crate::store::ImageDescriptor;
use std::collections::HashMap;

/// Decide whether the stored image is behaviorally identical to the
/// desired one. Pure; no I/O; never fails.
///
/// Architecture and OS compare exactly. Env, Entrypoint and Cmd compare as
/// ordered sequences with an absent field equivalent to an empty one.
/// WorkingDir and User normalize absence to "".
pub fn configs_equal(desired: &ImageConfig, actual: &ImageDescriptor) -> bool {
    if desired.architecture != actual.architecture {
        return false;
    }
    if desired.os != actual.os {
        return false;
    }

    let default_config = ContainerConfig::default();
    let desired = desired.config.as_ref().unwrap_or(&default_config);
    let actual = &actual.config;

    if !sequences_equal(&desired.env, &actual.env) {
        return false;
    }
    if !sequences_equal(&desired.entrypoint, &actual.entrypoint) {
        return false;
    }
    if !sequences_equal(&desired.cmd, &actual.cmd) {
        return false;
    }

    if normalized(&desired.working_dir) != normalized(&actual.working_dir) {
        return false;
    }
    if normalized(&desired.user) != normalized(&actual.user) {
        return false;
    }

    labels_equal(&desired.labels, &actual.labels)
}

fn sequences_equal(a: &Option<Vec<String>>, b: &Option<Vec<String>>) -> bool {
    let a: &[String] = a.as_deref().unwrap_or(&[]);
    let b: &[String] = b.as_deref().unwrap_or(&[]);
    a == b
}

fn normalized(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

/// Labels are equal only if both maps hold the same number of entries and
/// every desired key maps to the identical value in actual. An extra label
/// on the stored image therefore fails the comparison.
fn labels_equal(
    desired: &Option<HashMap<String, String>>,
    actual: &Option<HashMap<String, String>>,
) -> bool {
    let empty = HashMap::new();
    let desired = desired.as_ref().unwrap_or(&empty);
    let actual = actual.as_ref().unwrap_or(&empty);

    if desired.len() != actual.len() {
        return false;
    }
    desired
        .iter()
        .all(|(key, value)| actual.get(key) == Some(value))
}
