//! Config-driven entity serialization
//!
//! Entities are JSON objects. The serializer picks fields according to the
//! exclusion policy, resolves property paths (including the `__class__` and
//! `__discriminator__` metadata paths) and applies nested field configs to
//! related objects and collections.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

use dirbridge_core::{DirBridgeError, Result};

use crate::accessor::{
    field_config, is_exclude_all, is_field_excluded, is_metadata_property, split_property_path,
};
use crate::config::{EntityConfig, EntityConfigRegistry, FieldConfig, CLASS_NAME, DISCRIMINATOR};

/// Hook run on the serialized map of an entity
pub type PostSerializeHook = Arc<dyn Fn(&mut Map<String, Value>) + Send + Sync>;

/// Values the metadata property paths resolve to
#[derive(Debug, Clone, Default)]
pub struct SerializationContext {
    pub class_name: Option<String>,
    pub discriminator: Option<String>,
}

impl SerializationContext {
    pub fn for_class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: Some(class_name.into()),
            discriminator: None,
        }
    }

    pub fn with_discriminator(mut self, discriminator: impl Into<String>) -> Self {
        self.discriminator = Some(discriminator.into());
        self
    }
}

#[derive(Default, Clone)]
pub struct EntitySerializer {
    hooks: HashMap<String, PostSerializeHook>,
}

impl EntitySerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_hook<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: Fn(&mut Map<String, Value>) + Send + Sync + 'static,
    {
        self.hooks.insert(name.into(), Arc::new(hook));
    }

    /// Serialize an entity using the config registered for its type. Types
    /// without a config are serialized with all defaults.
    pub fn serialize_registered(
        &self,
        registry: &EntityConfigRegistry,
        entity_type: &str,
        entity: &Value,
    ) -> Result<Map<String, Value>> {
        let default_config = EntityConfig::default();
        let config = registry.get(entity_type).unwrap_or(&default_config);
        let context = SerializationContext::for_class(entity_type);
        self.serialize(entity, config, &context)
    }

    #[instrument(skip_all, fields(class = ?context.class_name))]
    pub fn serialize(
        &self,
        entity: &Value,
        config: &EntityConfig,
        context: &SerializationContext,
    ) -> Result<Map<String, Value>> {
        let object = entity.as_object().ok_or_else(|| {
            DirBridgeError::invalid_input("Only JSON objects can be serialized as entities")
        })?;

        let mut result = Map::new();
        for field in selected_fields(object, config) {
            let field_config = field_config(config, &field);
            let path = field_config.property_path.as_deref().unwrap_or(&field);

            let value = if is_metadata_property(path) {
                metadata_value(path, context)
            } else {
                resolve_path(object, path)
            };

            let value = if field_config.has_target_config() {
                self.serialize_related(value, &field_config)?
            } else {
                value
            };

            result.insert(field, value);
        }

        if let Some(hook_name) = &config.post_serialize {
            let hook = self.hooks.get(hook_name).ok_or_else(|| {
                DirBridgeError::configuration(format!(
                    "Post-serialize hook '{}' is not registered",
                    hook_name
                ))
            })?;
            hook(&mut result);
        }

        debug!("Serialized {} fields", result.len());
        Ok(result)
    }

    /// Serialize a related object, or each object of a related collection,
    /// with the field's nested config and target metadata
    fn serialize_related(&self, value: Value, field: &FieldConfig) -> Result<Value> {
        let config = &field.target;
        let context = field.target_context();
        match value {
            Value::Object(_) => Ok(Value::Object(self.serialize(&value, config, &context)?)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(_) => {
                        Ok(Value::Object(self.serialize(&item, config, &context)?))
                    }
                    other => Ok(other),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other),
        }
    }
}

/// Names of the fields to emit: the entity's own fields in their order,
/// then configured fields the entity does not carry
fn selected_fields(object: &Map<String, Value>, config: &EntityConfig) -> Vec<String> {
    let exclude_all = is_exclude_all(config);
    let included = |name: &str| match config.fields.get(name) {
        Some(field) => !is_field_excluded(field),
        None => !exclude_all,
    };

    let mut seen = HashSet::new();
    object
        .keys()
        .map(String::as_str)
        .chain(config.fields.keys().map(String::as_str))
        .filter(|name| included(*name) && seen.insert(*name))
        .map(str::to_owned)
        .collect()
}

fn metadata_value(path: &str, context: &SerializationContext) -> Value {
    let resolved = match path {
        CLASS_NAME => context.class_name.clone(),
        DISCRIMINATOR => context.discriminator.clone(),
        _ => None,
    };
    resolved.map(Value::String).unwrap_or(Value::Null)
}

fn resolve_path(object: &Map<String, Value>, path: &str) -> Value {
    let mut segments = split_property_path(path).into_iter();
    let Some(first) = segments.next() else {
        return Value::Null;
    };

    let mut current = match object.get(first) {
        Some(value) => value,
        None => return Value::Null,
    };
    for segment in segments {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}
