//! Raw directory settings as persisted by the administrator
//!
//! Settings are read key by key through a [`ConfigStore`] and collected into
//! [`RawDirectoryConfig`]. Nothing here is validated; the mapping builders
//! decide what is usable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use dirbridge_core::{ConfigStore, DirBridgeError, Result, RoleId};

pub const SERVER_BASE_DN: &str = "server_base_dn";
pub const USER_FILTER: &str = "user_filter";
pub const ROLE_FILTER: &str = "role_filter";
pub const ROLE_ID_ATTRIBUTE: &str = "role_id_attribute";
pub const ROLE_USER_ID_ATTRIBUTE: &str = "role_user_id_attribute";
pub const EXPORT_USER_BASE_DN: &str = "export_user_base_dn";
pub const EXPORT_USER_CLASS: &str = "export_user_class";
pub const ROLE_MAPPING: &str = "role_mapping";
pub const USER_MAPPING: &str = "user_mapping";

/// Every key read by [`RawDirectoryConfig::load`]
pub const SETTING_KEYS: [&str; 9] = [
    SERVER_BASE_DN,
    USER_FILTER,
    ROLE_FILTER,
    ROLE_ID_ATTRIBUTE,
    ROLE_USER_ID_ATTRIBUTE,
    EXPORT_USER_BASE_DN,
    EXPORT_USER_CLASS,
    ROLE_MAPPING,
    USER_MAPPING,
];

/// One row of the role mapping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRoleMapping {
    #[serde(rename = "ldapName", alias = "directoryRoleName")]
    pub directory_role_name: String,
    #[serde(rename = "crmRoles", alias = "localRoleIds", default)]
    pub local_role_ids: Vec<RoleId>,
}

impl RawRoleMapping {
    pub fn new(directory_role_name: impl Into<String>, local_role_ids: Vec<RoleId>) -> Self {
        Self {
            directory_role_name: directory_role_name.into(),
            local_role_ids,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDirectoryConfig {
    pub server_base_dn: String,
    pub user_filter: String,
    pub role_filter: String,
    pub role_id_attribute: String,
    pub role_user_id_attribute: String,
    pub export_user_base_dn: String,
    pub export_user_class: String,
    pub role_mapping: Vec<RawRoleMapping>,
    /// Local field name to directory attribute, in authoring order
    pub user_mapping: Map<String, Value>,
}

impl RawDirectoryConfig {
    /// Read all directory settings from a store. Absent keys keep their
    /// defaults.
    pub async fn load(store: &dyn ConfigStore) -> Result<Self> {
        let mut raw = Map::new();
        for key in SETTING_KEYS {
            if let Some(value) = store.get(key).await? {
                if !value.is_null() {
                    raw.insert(key.to_string(), value);
                }
            }
        }

        debug!("Loaded {} directory settings", raw.len());

        serde_json::from_value(Value::Object(raw)).map_err(|e| {
            DirBridgeError::configuration(format!("Invalid directory settings: {}", e))
        })
    }

    /// The user mapping as `(local field, directory attribute)` pairs.
    /// Unset attributes come through as empty strings.
    pub fn user_mapping_pairs(&self) -> Vec<(String, String)> {
        self.user_mapping
            .iter()
            .map(|(field, attribute)| {
                let attribute = match attribute {
                    Value::Null => String::new(),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (field.clone(), attribute)
            })
            .collect()
    }
}

/// In-process [`ConfigStore`]
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.get_mut().insert(key.into(), value);
        self
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.values.write().await.insert(key.into(), value);
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }
}
