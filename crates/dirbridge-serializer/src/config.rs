//! Declarative entity serialization configuration
//!
//! Configuration is authored sparsely: every key may be left out and the
//! accessor functions in [`crate::accessor`] supply the defaults. An example
//! in JSON form:
//!
//! ```json
//! {
//!     "exclusion_policy": "all",
//!     "fields": {
//!         "id": {},
//!         "type": { "property_path": "__discriminator__" },
//!         "owner": { "fields": { "username": {} }, "exclusion_policy": "all" }
//!     },
//!     "order_by": [{ "field": "id", "direction": "DESC" }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use dirbridge_core::{DirBridgeError, Result};

use crate::serializer::SerializationContext;

/// Property path that resolves to the discriminator value of an entity
pub const DISCRIMINATOR: &str = "__discriminator__";

/// Property path that resolves to the class name of an entity
pub const CLASS_NAME: &str = "__class__";

pub const EXCLUSION_POLICY: &str = "exclusion_policy";
pub const DISABLE_PARTIAL_LOAD: &str = "disable_partial_load";
pub const HINTS: &str = "hints";
pub const FIELDS: &str = "fields";
pub const ORDER_BY: &str = "order_by";
pub const POST_SERIALIZE: &str = "post_serialize";
pub const PROPERTY_PATH: &str = "property_path";
pub const EXCLUDE: &str = "exclude";
pub const TARGET_CLASS: &str = "target_class";
pub const TARGET_DISCRIMINATOR: &str = "target_discriminator";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExclusionPolicy {
    /// Only explicitly configured fields are serialized
    All,
    /// Every field is serialized unless excluded
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// A query hint, either a bare name or a name with a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Hint {
    Name(String),
    WithValue { name: String, value: Value },
}

impl Hint {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::WithValue { name, .. } => name,
        }
    }
}

/// Serialization config of one entity type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusion_policy: Option<ExclusionPolicy>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_partial_load: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderBy>,
    /// Name of a hook registered on the serializer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_serialize: Option<String>,
}

impl EntityConfig {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| {
            DirBridgeError::invalid_input(format!("Invalid entity config: {}", e))
        })
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, field: FieldConfig) -> Self {
        self.fields.insert(name.into(), field);
        self
    }
}

/// Per-field override. A field may carry the config of the related entity
/// it points to, written inline next to its own keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<bool>,
    /// Class name `__class__` resolves to inside the related entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_discriminator: Option<String>,
    #[serde(flatten)]
    pub target: EntityConfig,
}

impl FieldConfig {
    pub fn property_path(path: impl Into<String>) -> Self {
        Self {
            property_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn excluded() -> Self {
        Self {
            exclude: Some(true),
            ..Self::default()
        }
    }

    pub fn has_target_config(&self) -> bool {
        !self.target.is_empty()
    }

    /// Metadata values for the related entity this field points to
    pub fn target_context(&self) -> SerializationContext {
        SerializationContext {
            class_name: self.target_class.clone(),
            discriminator: self.target_discriminator.clone(),
        }
    }
}

/// Entity configs keyed by entity type identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityConfigRegistry {
    entities: BTreeMap<String, EntityConfig>,
}

impl EntityConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity_type: impl Into<String>, config: EntityConfig) {
        self.entities.insert(entity_type.into(), config);
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntityConfig> {
        self.entities.get(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}
