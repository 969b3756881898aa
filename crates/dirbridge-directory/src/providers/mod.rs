//! Directory client implementations

#[cfg(feature = "ldap")]
pub mod ldap;
