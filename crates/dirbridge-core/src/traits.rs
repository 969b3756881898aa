//! Collaborator traits
//!
//! The sync core never talks to a directory server, a settings table or a
//! database itself. Hosts supply implementations of these traits.

use crate::{directory::DirectoryEntry, error::Result, ids::RoleId, models::RoleRef};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

// =============================================================================
// Directory
// =============================================================================

/// Search and write access to a directory service
#[async_trait]
pub trait DirectorySearchClient: Send + Sync {
    /// Search below `base_dn`. No match is an empty vector, not an error.
    async fn search(&self, base_dn: &str, filter: &str) -> Result<Vec<DirectoryEntry>>;

    /// Create or replace the entry at `dn`
    async fn write(&self, dn: &str, entry: &DirectoryEntry) -> Result<()>;

    async fn exists(&self, dn: &str) -> Result<bool>;
}

// =============================================================================
// Settings
// =============================================================================

/// Key/value access to persisted settings
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
}

// =============================================================================
// Roles
// =============================================================================

/// Produces role references without loading the role records
pub trait RoleReferenceLookup: Send + Sync {
    fn reference(&self, role_id: &RoleId) -> Result<RoleRef>;
}

/// Lookup that hands out deferred references for any id
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredRoleLookup;

impl RoleReferenceLookup for DeferredRoleLookup {
    fn reference(&self, role_id: &RoleId) -> Result<RoleRef> {
        Ok(RoleRef::deferred(role_id.clone()))
    }
}

// =============================================================================
// Users
// =============================================================================

/// Get/set access to named fields of a record.
///
/// Names are resolved into `Field` once, when a mapping is built, so the
/// per-entry work never parses field names.
pub trait FieldAccessor {
    type Field: Clone + fmt::Debug + PartialEq + Send + Sync;

    fn resolve_field(name: &str) -> Self::Field;

    fn get_field(&self, field: &Self::Field) -> Value;

    fn set_field(&mut self, field: &Self::Field, value: Value) -> Result<()>;
}

/// A local record that can be synced with a directory entry
pub trait DirectoryUser: FieldAccessor + Send + Sync {
    fn username(&self) -> &str;

    fn password(&self) -> Option<&str>;

    fn set_password(&mut self, password: Option<String>);

    fn dn(&self) -> Option<&str>;

    fn set_dn(&mut self, dn: String);

    fn add_role(&mut self, role: RoleRef);
}

/// Persistence for synced users
#[async_trait]
pub trait UserRepository<U>: Send + Sync
where
    U: DirectoryUser,
{
    async fn find_by_username(&self, username: &str) -> Result<Option<U>>;

    async fn save(&self, user: &U) -> Result<()>;
}
