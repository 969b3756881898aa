//! Agent configuration

use anyhow::Result;
use async_trait::async_trait;
use config::{Config, ConfigError};
use serde::Deserialize;
use serde_json::Value;

use dirbridge_core::{ConfigStore, DirBridgeError};
use dirbridge_directory::settings::{ROLE_MAPPING, USER_MAPPING};

/// Table holding the directory mapping keys
const MAPPING_TABLE: &str = "mapping";

pub struct Settings {
    pub ldap: LdapSettings,
    pub mapping: MappingStore,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LdapSettings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub bind_dn: String,
    #[serde(default)]
    pub bind_password: String,
    #[serde(default)]
    pub start_tls: bool,
    #[serde(default)]
    pub skip_tls_verify: bool,
}

fn default_server_url() -> String {
    "ldap://localhost:389".to_string()
}

#[cfg(feature = "ldap")]
impl LdapSettings {
    pub fn connection(&self) -> dirbridge_directory::LdapConnectionConfig {
        dirbridge_directory::LdapConnectionConfig {
            server_url: self.server_url.clone(),
            bind_dn: self.bind_dn.clone(),
            bind_password: self.bind_password.clone(),
            start_tls: self.start_tls,
            skip_tls_verify: self.skip_tls_verify,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .set_default("ldap.server_url", default_server_url())?
            .set_default("ldap.start_tls", false)?
            .set_default("ldap.skip_tls_verify", false)?
            // Load from config file if present
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // Load from environment variables with DIRBRIDGE_ prefix
            .add_source(
                config::Environment::with_prefix("DIRBRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let ldap = config.get::<LdapSettings>("ldap")?;
        Ok(Self {
            ldap,
            mapping: MappingStore::new(config),
        })
    }
}

/// [`ConfigStore`] over the `mapping` table of the agent configuration.
///
/// `role_mapping` and `user_mapping` may also be given as JSON text, which
/// keeps the case of field names that file and environment sources would
/// otherwise fold.
pub struct MappingStore {
    config: Config,
}

impl MappingStore {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigStore for MappingStore {
    async fn get(&self, key: &str) -> dirbridge_core::Result<Option<Value>> {
        let path = format!("{}.{}", MAPPING_TABLE, key);
        let value = match self.config.get::<Value>(&path) {
            Ok(value) => value,
            Err(ConfigError::NotFound(_)) => return Ok(None),
            Err(e) => {
                return Err(DirBridgeError::configuration(format!(
                    "Invalid setting '{}': {}",
                    path, e
                )))
            }
        };

        match value {
            Value::String(text) if key == ROLE_MAPPING || key == USER_MAPPING => {
                serde_json::from_str(&text).map(Some).map_err(|e| {
                    DirBridgeError::configuration(format!(
                        "Setting '{}' is not valid JSON: {}",
                        path, e
                    ))
                })
            }
            value => Ok(Some(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};
    use dirbridge_directory::RawDirectoryConfig;
    use serde_json::json;

    fn settings(source: &str) -> Settings {
        let config = Config::builder()
            .set_default("ldap.server_url", default_server_url())
            .unwrap()
            .add_source(File::from_str(source, FileFormat::Json))
            .build()
            .unwrap();
        Settings::from_config(config).unwrap()
    }

    #[test]
    fn test_ldap_defaults() {
        let settings = settings(r#"{ "ldap": { "bind_dn": "cn=admin,dc=example" } }"#);
        assert_eq!(settings.ldap.server_url, "ldap://localhost:389");
        assert_eq!(settings.ldap.bind_dn, "cn=admin,dc=example");
        assert!(!settings.ldap.start_tls);
    }

    #[tokio::test]
    async fn test_mapping_store_reads_table() {
        let settings = settings(
            r#"{
                "ldap": {},
                "mapping": {
                    "server_base_dn": "dc=example",
                    "user_filter": "(objectClass=person)",
                    "user_mapping": "{\"username\": \"uid\", \"firstName\": \"givenName\"}",
                    "role_mapping": [{ "ldapName": "Admins", "crmRoles": [1, 2] }]
                }
            }"#,
        );

        assert_eq!(
            settings.mapping.get("server_base_dn").await.unwrap(),
            Some(json!("dc=example"))
        );
        assert_eq!(settings.mapping.get("role_filter").await.unwrap(), None);

        let raw = RawDirectoryConfig::load(&settings.mapping).await.unwrap();
        assert_eq!(raw.user_filter, "(objectClass=person)");
        assert_eq!(
            raw.user_mapping_pairs(),
            vec![
                ("username".to_string(), "uid".to_string()),
                ("firstName".to_string(), "givenName".to_string()),
            ]
        );
        assert_eq!(raw.role_mapping.len(), 1);
        assert_eq!(raw.role_mapping[0].local_role_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_mapping_text() {
        let settings = settings(r#"{ "ldap": {}, "mapping": { "user_mapping": "{not json" } }"#);
        let err = settings.mapping.get("user_mapping").await.unwrap_err();
        assert!(matches!(err, DirBridgeError::ConfigurationError { .. }));
    }
}
