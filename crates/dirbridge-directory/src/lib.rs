//! dirbridge directory - user sync between a directory service and local
//! user records
//!
//! # Architecture
//!
//! The directory side is reached only through the collaborator traits in
//! `dirbridge-core` (`DirectorySearchClient`, `ConfigStore`,
//! `RoleReferenceLookup`, `UserRepository`). On top of them:
//! - `mapper`: attribute mapping, export entries, DNs and hydration
//! - `roles`: role mapping table and local role derivation
//! - `sync`: the `DirectorySyncService` that ties both together
//!
//! An `ldap3`-backed client is available with the `ldap` feature.

pub mod mapper;
pub mod providers;
pub mod repository;
pub mod roles;
pub mod settings;
pub mod sync;

#[cfg(test)]
mod tests;

#[cfg(feature = "ldap")]
pub use providers::ldap::{LdapConnectionConfig, LdapDirectoryClient};

pub use mapper::{AttributeMapping, AttributeMappingRow};
pub use repository::InMemoryUserRepository;
pub use roles::RoleMapping;
pub use settings::{MemoryConfigStore, RawDirectoryConfig, RawRoleMapping};
pub use sync::{DirectorySyncService, MappingConfig, SearchParams, SyncReport, SyncState, UserSyncOutcome};
