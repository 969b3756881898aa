//! LDAP directory client
//!
//! Implements [`DirectorySearchClient`] on top of `ldap3`:
//! - Subtree searches returning all user attributes
//! - Entry writes (replace when the entry exists, add otherwise)
//! - Existence checks through base-scope searches
//!
//! Requires the `ldap` feature to be enabled.

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry, SearchResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

use dirbridge_core::{
    AttributeValue, DirBridgeError, DirectoryEntry, DirectorySearchClient, Result,
};

/// Result code returned when the searched base does not exist
const NO_SUCH_OBJECT: u32 = 32;

/// Connection settings for the directory server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConnectionConfig {
    /// Server URL (e.g., "ldaps://ldap.company.com:636")
    pub server_url: String,
    pub bind_dn: String,
    #[serde(skip_serializing)]
    pub bind_password: String,
    #[serde(default)]
    pub start_tls: bool,
    /// Skip TLS verification (not recommended)
    #[serde(default)]
    pub skip_tls_verify: bool,
}

pub struct LdapDirectoryClient {
    config: LdapConnectionConfig,
}

impl LdapDirectoryClient {
    pub fn new(config: LdapConnectionConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> Result<Ldap> {
        let settings = LdapConnSettings::new()
            .set_starttls(self.config.start_tls)
            .set_no_tls_verify(self.config.skip_tls_verify);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.server_url)
            .await
            .map_err(|e| {
                DirBridgeError::directory_unavailable(format!("LDAP connection failed: {}", e))
            })?;

        ldap3::drive!(conn);

        ldap.simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await
            .and_then(|res| res.success())
            .map_err(|e| {
                DirBridgeError::directory_unavailable(format!("LDAP bind failed: {}", e))
            })?;

        Ok(ldap)
    }

    async fn entry_exists(ldap: &mut Ldap, dn: &str) -> Result<bool> {
        let SearchResult(entries, result) = ldap
            .search(dn, Scope::Base, "(objectClass=*)", vec!["1.1"])
            .await
            .map_err(|e| {
                DirBridgeError::directory_unavailable(format!("LDAP search failed: {}", e))
            })?;

        match result.rc {
            0 => Ok(!entries.is_empty()),
            NO_SUCH_OBJECT => Ok(false),
            rc => Err(DirBridgeError::directory_unavailable(format!(
                "LDAP search failed with result code {}: {}",
                rc, result.text
            ))),
        }
    }
}

/// Convert an `ldap3` search entry, keeping multi-valued attributes as lists
fn search_entry_to_directory_entry(entry: SearchEntry) -> DirectoryEntry {
    let mut result = DirectoryEntry::with_dn(entry.dn);
    for (name, mut values) in entry.attrs {
        let value = if values.len() == 1 {
            AttributeValue::Scalar(values.remove(0))
        } else {
            AttributeValue::List(values)
        };
        result.set(name, value);
    }
    result
}

fn attribute_values(value: &AttributeValue) -> HashSet<String> {
    value
        .raw_values()
        .into_iter()
        .filter(|v| !v.is_empty())
        .collect()
}

#[async_trait]
impl DirectorySearchClient for LdapDirectoryClient {
    #[instrument(skip(self), fields(server = %self.config.server_url))]
    async fn search(&self, base_dn: &str, filter: &str) -> Result<Vec<DirectoryEntry>> {
        let mut ldap = self.connect().await?;

        let SearchResult(entries, result) = ldap
            .search(base_dn, Scope::Subtree, filter, vec!["*"])
            .await
            .map_err(|e| {
                DirBridgeError::directory_unavailable(format!("LDAP search failed: {}", e))
            })?;

        ldap.unbind().await.ok();

        if result.rc != 0 && result.rc != NO_SUCH_OBJECT {
            return Err(DirBridgeError::directory_unavailable(format!(
                "LDAP search failed with result code {}: {}",
                result.rc, result.text
            )));
        }

        let entries: Vec<DirectoryEntry> = entries
            .into_iter()
            .map(|e| search_entry_to_directory_entry(SearchEntry::construct(e)))
            .collect();

        debug!("Fetched {} entries from LDAP", entries.len());
        Ok(entries)
    }

    #[instrument(skip(self, entry), fields(server = %self.config.server_url))]
    async fn write(&self, dn: &str, entry: &DirectoryEntry) -> Result<()> {
        let mut ldap = self.connect().await?;

        let result = if Self::entry_exists(&mut ldap, dn).await? {
            let mods = entry
                .attributes
                .iter()
                .map(|(name, value)| Mod::Replace(name.clone(), attribute_values(value)))
                .collect::<Vec<_>>();
            ldap.modify(dn, mods).await
        } else {
            let attrs = entry
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), attribute_values(value)))
                .filter(|(_, values)| !values.is_empty())
                .collect::<Vec<_>>();
            ldap.add(dn, attrs).await
        };

        let outcome = result.and_then(|res| res.success()).map_err(|e| {
            DirBridgeError::directory_unavailable(format!("LDAP write of {} failed: {}", dn, e))
        });

        ldap.unbind().await.ok();
        outcome?;

        info!("Wrote directory entry {}", dn);
        Ok(())
    }

    async fn exists(&self, dn: &str) -> Result<bool> {
        let mut ldap = self.connect().await?;
        let exists = Self::entry_exists(&mut ldap, dn).await;
        ldap.unbind().await.ok();
        exists
    }
}
