//! Attribute-map helpers.
//!
//! Supports:
//! - Overlaying and filtering flat attribute maps (`extend`, `omit`, `difference`)
//! - Field-level comparison between two snapshots (`diff_keys`)
//! - JSON Merge Patch (RFC 7396) for stored documents

use serde_json::{Map, Value};

/// Flat mapping from field name to value, in insertion order.
pub type Attributes = Map<String, Value>;

/// Convert a JSON value into an attribute map.
///
/// Returns `None` for anything that is not an object.
#[must_use]
pub fn to_attributes(value: Value) -> Option<Attributes> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Overlay `overlay` onto `base`; keys in `overlay` win.
#[must_use]
pub fn extend(mut base: Attributes, overlay: &Attributes) -> Attributes {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
    base
}

/// Copy of `attrs` without the listed keys.
#[must_use]
pub fn omit(attrs: &Attributes, keys: &[String]) -> Attributes {
    attrs
        .iter()
        .filter(|(key, _)| !keys.contains(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Keys from `keys` that are not contained in `exclude`.
pub fn difference<'a>(keys: impl IntoIterator<Item = &'a String>, exclude: &[String]) -> Vec<&'a String> {
    keys.into_iter().filter(|key| !exclude.contains(key)).collect()
}

/// Fields whose values differ between `old` and `new`, including fields
/// present in only one of them. Order follows `new`, then fields only in `old`.
#[must_use]
pub fn diff_keys(old: &Attributes, new: &Attributes) -> Vec<String> {
    let mut keys: Vec<String> = new
        .iter()
        .filter(|(key, value)| old.get(*key) != Some(*value))
        .map(|(key, _)| key.clone())
        .collect();

    keys.extend(old.keys().filter(|key| !new.contains_key(*key)).cloned());
    keys
}

/// Apply a JSON Merge Patch (RFC 7396) to a value.
///
/// Rules:
/// - If patch is not an object, replace target with patch
/// - If patch is an object, merge recursively
///   - null values in patch remove keys from target
///   - other values replace/add keys
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_obj) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }

    if let Value::Object(target_obj) = target {
        for (key, value) in patch_obj {
            if value.is_null() {
                target_obj.remove(key);
            } else if value.is_object() {
                let entry = target_obj
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                apply_merge_patch(entry, value);
            } else {
                target_obj.insert(key.clone(), value.clone());
            }
        }
    }
}
