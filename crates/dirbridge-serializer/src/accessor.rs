//! Read helpers over [`EntityConfig`]
//!
//! All functions are total: a missing key yields the default, never an
//! error, so partially written configs stay usable.

use serde_json::{Map, Value};
use std::borrow::Cow;

use crate::config::{EntityConfig, ExclusionPolicy, FieldConfig};

pub fn exclusion_policy(config: &EntityConfig) -> ExclusionPolicy {
    config.exclusion_policy.unwrap_or_default()
}

pub fn is_exclude_all(config: &EntityConfig) -> bool {
    config.exclusion_policy == Some(ExclusionPolicy::All)
}

pub fn is_field_excluded(field: &FieldConfig) -> bool {
    field.exclude.unwrap_or(false)
}

pub fn is_partial_load_allowed(config: &EntityConfig) -> bool {
    !config.disable_partial_load.unwrap_or(false)
}

pub fn has_field_config(config: &EntityConfig, field: &str) -> bool {
    config.fields.contains_key(field)
}

/// Config of `field`, or an empty (all defaults) config when there is none
pub fn field_config<'a>(config: &'a EntityConfig, field: &str) -> Cow<'a, FieldConfig> {
    match config.fields.get(field) {
        Some(field_config) => Cow::Borrowed(field_config),
        None => Cow::Owned(FieldConfig::default()),
    }
}

/// Whether a property path names a metadata pseudo-field such as
/// `__class__` or `__discriminator__`
pub fn is_metadata_property(path: &str) -> bool {
    path.starts_with("__")
}

/// Split a property path on `.`. Empty segments are kept.
pub fn split_property_path(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

/// Value under `key` in a raw config map, or an empty array
pub fn array_value(config: &Map<String, Value>, key: &str) -> Value {
    config
        .get(key)
        .filter(|value| !value.is_null())
        .cloned()
        .unwrap_or_else(|| Value::Array(vec![]))
}
