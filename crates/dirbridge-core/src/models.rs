//! Domain models for dirbridge
//!
//! `LocalUser` is the application-side record that directory sync hydrates
//! and export reads from. Its fields are addressed by name through
//! [`FieldAccessor`], with names resolved to [`UserField`] once, when a
//! mapping is built.

use crate::error::{DirBridgeError, Result};
use crate::ids::*;
use crate::traits::{DirectoryUser, FieldAccessor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// =============================================================================
// Roles
// =============================================================================

/// Reference to a local role.
///
/// A deferred reference only carries the id; `label` is filled in when the
/// role record has actually been loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    pub id: RoleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl RoleRef {
    pub fn deferred(id: RoleId) -> Self {
        Self { id, label: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.label.is_some()
    }
}

// =============================================================================
// Users
// =============================================================================

/// A user record on the application side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: UserId,
    pub username: String,
    /// Never serialized and never overwritten by directory data
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Distinguished name of the matching directory entry, once known
    pub dn: Option<String>,
    pub email: Option<String>,
    pub name_prefix: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub name_suffix: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    /// Values of extended (custom) fields, keyed by field name
    #[serde(default)]
    pub extended: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalUser {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn has_role(&self, id: &RoleId) -> bool {
        self.roles.iter().any(|r| &r.id == id)
    }
}

impl Default for LocalUser {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            username: String::new(),
            password: None,
            dn: None,
            email: None,
            name_prefix: None,
            first_name: None,
            middle_name: None,
            last_name: None,
            name_suffix: None,
            enabled: true,
            roles: vec![],
            extended: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Addressable fields of [`LocalUser`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserField {
    Username,
    Password,
    Email,
    NamePrefix,
    FirstName,
    MiddleName,
    LastName,
    NameSuffix,
    Enabled,
    /// Any other name lands in `LocalUser::extended`
    Extended(String),
}

impl UserField {
    pub fn from_name(name: &str) -> Self {
        match name {
            "username" => Self::Username,
            "password" => Self::Password,
            "email" => Self::Email,
            "namePrefix" => Self::NamePrefix,
            "firstName" => Self::FirstName,
            "middleName" => Self::MiddleName,
            "lastName" => Self::LastName,
            "nameSuffix" => Self::NameSuffix,
            "enabled" => Self::Enabled,
            other => Self::Extended(other.to_string()),
        }
    }
}

/// Collapse a JSON value into the single string a text field can hold.
/// Lists contribute their first element.
fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Array(items) => items.into_iter().find_map(value_to_text),
        other => Some(other.to_string()),
    }
}

fn text_to_value(text: &Option<String>) -> Value {
    text.as_ref()
        .map(|s| Value::String(s.clone()))
        .unwrap_or(Value::Null)
}

impl FieldAccessor for LocalUser {
    type Field = UserField;

    fn resolve_field(name: &str) -> UserField {
        UserField::from_name(name)
    }

    fn get_field(&self, field: &UserField) -> Value {
        match field {
            UserField::Username => Value::String(self.username.clone()),
            UserField::Password => text_to_value(&self.password),
            UserField::Email => text_to_value(&self.email),
            UserField::NamePrefix => text_to_value(&self.name_prefix),
            UserField::FirstName => text_to_value(&self.first_name),
            UserField::MiddleName => text_to_value(&self.middle_name),
            UserField::LastName => text_to_value(&self.last_name),
            UserField::NameSuffix => text_to_value(&self.name_suffix),
            UserField::Enabled => Value::Bool(self.enabled),
            UserField::Extended(name) => self.extended.get(name).cloned().unwrap_or(Value::Null),
        }
    }

    fn set_field(&mut self, field: &UserField, value: Value) -> Result<()> {
        match field {
            UserField::Username => {
                self.username = value_to_text(value)
                    .ok_or_else(|| DirBridgeError::invalid_input("username cannot be empty"))?;
            }
            UserField::Password => self.password = value_to_text(value),
            UserField::Email => self.email = value_to_text(value),
            UserField::NamePrefix => self.name_prefix = value_to_text(value),
            UserField::FirstName => self.first_name = value_to_text(value),
            UserField::MiddleName => self.middle_name = value_to_text(value),
            UserField::LastName => self.last_name = value_to_text(value),
            UserField::NameSuffix => self.name_suffix = value_to_text(value),
            UserField::Enabled => {
                self.enabled = match value {
                    Value::Bool(b) => b,
                    other => match value_to_text(other).as_deref() {
                        Some("TRUE") | Some("true") | Some("1") => true,
                        Some("FALSE") | Some("false") | Some("0") => false,
                        _ => {
                            return Err(DirBridgeError::invalid_input(
                                "enabled expects a boolean value",
                            ))
                        }
                    },
                };
            }
            UserField::Extended(name) => {
                self.extended.insert(name.clone(), value);
            }
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl DirectoryUser for LocalUser {
    fn username(&self) -> &str {
        &self.username
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    fn set_password(&mut self, password: Option<String>) {
        self.password = password;
    }

    fn dn(&self) -> Option<&str> {
        self.dn.as_deref()
    }

    fn set_dn(&mut self, dn: String) {
        self.dn = Some(dn);
    }

    fn add_role(&mut self, role: RoleRef) {
        if !self.has_role(&role.id) {
            self.roles.push(role);
        }
    }
}
