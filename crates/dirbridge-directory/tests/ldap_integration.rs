//! Integration tests against a live LDAP server
//!
//! These tests require a writable directory. Set the following environment
//! variables:
//! - LDAP_URL: Server URL (default: ldap://localhost:389)
//! - LDAP_BIND_DN: Bind DN (default: cn=admin,dc=example,dc=org)
//! - LDAP_BIND_PASSWORD: Bind password (default: admin)
//! - LDAP_BASE_DN: Base DN holding an `ou=people` subtree (default: dc=example,dc=org)
//!
//! Run with: cargo test -p dirbridge-directory --features ldap --test ldap_integration -- --ignored

#![cfg(feature = "ldap")]

use serde_json::json;
use std::sync::Arc;

use dirbridge_core::{DeferredRoleLookup, LocalUser, UserRepository};
use dirbridge_directory::{
    DirectorySyncService, InMemoryUserRepository, LdapConnectionConfig, LdapDirectoryClient,
    MappingConfig, RawDirectoryConfig,
};

// =============================================================================
// Test Fixtures
// =============================================================================

/// Creates a unique username to avoid conflicts between test runs
fn test_username() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis();
    format!("dirbridge_{}", timestamp)
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn ldap_available() -> bool {
    std::env::var("LDAP_URL").is_ok() || std::net::TcpStream::connect("localhost:389").is_ok()
}

fn base_dn() -> String {
    env_or("LDAP_BASE_DN", "dc=example,dc=org")
}

fn client() -> Arc<LdapDirectoryClient> {
    Arc::new(LdapDirectoryClient::new(LdapConnectionConfig {
        server_url: env_or("LDAP_URL", "ldap://localhost:389"),
        bind_dn: env_or("LDAP_BIND_DN", "cn=admin,dc=example,dc=org"),
        bind_password: env_or("LDAP_BIND_PASSWORD", "admin"),
        start_tls: false,
        skip_tls_verify: true,
    }))
}

fn raw_config(username: &str) -> RawDirectoryConfig {
    let base_dn = base_dn();
    serde_json::from_value(json!({
        "server_base_dn": base_dn,
        "user_filter": format!("(&(objectClass=inetOrgPerson)(uid={}))", username),
        "role_filter": "objectClass=groupOfNames",
        "role_id_attribute": "cn",
        "role_user_id_attribute": "member",
        "export_user_base_dn": format!("ou=people,{}", base_dn),
        "export_user_class": "inetOrgPerson",
        "user_mapping": {
            "username": "uid",
            "firstName": "givenName",
            "lastName": "sn",
            "email": "mail"
        }
    }))
    .unwrap()
}

// =============================================================================
// Export and Sync Flow Tests
// =============================================================================

#[tokio::test]
#[ignore = "Requires running LDAP server"]
async fn test_export_then_sync_round_trip() {
    if !ldap_available() {
        eprintln!("Skipping: LDAP not available");
        return;
    }

    let username = test_username();
    let service = DirectorySyncService::<_, LocalUser>::new(
        client(),
        Arc::new(DeferredRoleLookup),
        MappingConfig::default(),
    );
    service.reconfigure(&raw_config(&username)).await;

    let mut user = LocalUser::new(username.clone());
    user.first_name = Some("Test".to_string());
    user.last_name = Some("User".to_string());
    user.email = Some(format!("{}@example.org", username));

    assert!(!service.user_exists(&user).await.unwrap());
    let dn = service.export_user(&user).await.unwrap();
    assert!(service.user_exists(&user).await.unwrap());

    let repository = InMemoryUserRepository::<LocalUser>::new();
    let report = service.sync_all(&repository).await.unwrap();
    assert_eq!(report.synced(), 1);

    let synced = repository.find_by_username(&username).await.unwrap().unwrap();
    assert_eq!(synced.dn.as_deref(), Some(dn.as_str()));
    assert_eq!(synced.first_name.as_deref(), Some("Test"));
    assert_eq!(synced.last_name.as_deref(), Some("User"));
}

#[tokio::test]
#[ignore = "Requires running LDAP server"]
async fn test_export_updates_existing_entry() {
    if !ldap_available() {
        return;
    }

    let username = test_username();
    let service = DirectorySyncService::<_, LocalUser>::new(
        client(),
        Arc::new(DeferredRoleLookup),
        MappingConfig::default(),
    );
    service.reconfigure(&raw_config(&username)).await;

    let mut user = LocalUser::new(username.clone());
    user.last_name = Some("Before".to_string());
    service.export_user(&user).await.unwrap();

    user.last_name = Some("After".to_string());
    service.export_user(&user).await.unwrap();

    let config = service.config().await;
    let entries = service.find_users(&config.user_search()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].decode("sn").map(|v| v.into_values()),
        Some(vec!["After".to_string()])
    );
}
