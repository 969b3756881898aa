//! Unit tests for dirbridge-directory

use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use dirbridge_core::{
    AttributeValue, DeferredRoleLookup, DirBridgeError, DirectoryEntry, DirectorySearchClient,
    LocalUser, Result, RoleId, RoleRef, RoleReferenceLookup, UserField, UserRepository,
};

use crate::mapper::*;
use crate::repository::InMemoryUserRepository;
use crate::roles::*;
use crate::settings::*;
use crate::sync::*;

// =============================================================================
// Fixtures
// =============================================================================

const USER_SEARCH_FILTER: &str = "(objectClass=inetOrgPerson)";

fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
    raw.iter()
        .map(|(field, attribute)| (field.to_string(), attribute.to_string()))
        .collect()
}

fn person(uid: &str, given_name: &str) -> DirectoryEntry {
    DirectoryEntry::with_dn(format!("uid={},ou=people,dc=example", uid))
        .with("uid", uid)
        .with("givenName", given_name)
}

fn group(cn: &str) -> DirectoryEntry {
    DirectoryEntry::with_dn(format!("cn={},ou=groups,dc=example", cn)).with(
        "cn",
        AttributeValue::Counted {
            count: Some(1),
            values: vec![cn.to_string()],
        },
    )
}

fn raw_config() -> RawDirectoryConfig {
    serde_json::from_value(json!({
        "server_base_dn": "dc=example",
        "user_filter": USER_SEARCH_FILTER,
        "role_filter": "objectClass=groupOfNames",
        "role_id_attribute": "cn",
        "role_user_id_attribute": "member",
        "export_user_base_dn": "ou=people,dc=example",
        "export_user_class": "inetOrgPerson",
        "role_mapping": [
            { "ldapName": "Admins", "crmRoles": [1] },
            { "ldapName": "Sales", "crmRoles": [2, 3] },
            { "ldapName": "Admins", "crmRoles": [4] }
        ],
        "user_mapping": {
            "username": "uid",
            "firstName": "givenName",
            "email": "mail",
            "lastName": ""
        }
    }))
    .unwrap()
}

/// Directory fake: user entries for the user filter, role entries per
/// member DN, optional failures per member DN
#[derive(Default)]
struct FakeDirectory {
    users: Vec<DirectoryEntry>,
    roles_by_member: HashMap<String, Vec<DirectoryEntry>>,
    failing_members: Vec<String>,
    existing: Vec<String>,
    searches: Mutex<Vec<(String, String)>>,
    writes: Mutex<Vec<(String, DirectoryEntry)>>,
}

impl FakeDirectory {
    fn with_users(users: Vec<DirectoryEntry>) -> Self {
        Self {
            users,
            ..Self::default()
        }
    }

    fn with_roles(mut self, member_dn: &str, roles: Vec<DirectoryEntry>) -> Self {
        self.roles_by_member.insert(member_dn.to_string(), roles);
        self
    }

    fn failing_for(mut self, member_dn: &str) -> Self {
        self.failing_members.push(member_dn.to_string());
        self
    }

    fn searches(&self) -> Vec<(String, String)> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectorySearchClient for FakeDirectory {
    async fn search(&self, base_dn: &str, filter: &str) -> Result<Vec<DirectoryEntry>> {
        self.searches
            .lock()
            .unwrap()
            .push((base_dn.to_string(), filter.to_string()));

        if filter == USER_SEARCH_FILTER {
            return Ok(self.users.clone());
        }

        let member_clause = |dn: &str| format!("(member={}))", dn);
        if self
            .failing_members
            .iter()
            .any(|dn| filter.ends_with(&member_clause(dn)))
        {
            return Err(DirBridgeError::directory_unavailable("connection reset"));
        }

        Ok(self
            .roles_by_member
            .iter()
            .filter(|(dn, _)| filter.ends_with(&member_clause(dn)))
            .flat_map(|(_, roles)| roles.clone())
            .collect())
    }

    async fn write(&self, dn: &str, entry: &DirectoryEntry) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((dn.to_string(), entry.clone()));
        Ok(())
    }

    async fn exists(&self, dn: &str) -> Result<bool> {
        Ok(self.existing.iter().any(|existing| existing == dn))
    }
}

fn service(directory: FakeDirectory) -> (Arc<FakeDirectory>, DirectorySyncService<FakeDirectory, LocalUser>) {
    let directory = Arc::new(directory);
    let config = MappingConfig::from_raw::<LocalUser>(&raw_config());
    let service = DirectorySyncService::new(directory.clone(), Arc::new(DeferredRoleLookup), config);
    (directory, service)
}

// =============================================================================
// Attribute Mapper Tests
// =============================================================================

#[cfg(test)]
mod mapper_tests {
    use super::*;

    #[test]
    fn test_blank_attributes_are_dropped() {
        let mapping = build_mapping::<LocalUser>(&pairs(&[("username", "uid"), ("email", "")]));

        assert_eq!(mapping.len(), 1);
        let row = &mapping.rows()[0];
        assert_eq!(row.directory_attribute, "uid");
        assert_eq!(row.local_field, "username");
        assert_eq!(row.accessor_method, "setUsername");
        assert_eq!(row.field, UserField::Username);
    }

    #[test]
    fn test_missing_username_yields_empty_mapping() {
        let mapping = build_mapping::<LocalUser>(&pairs(&[("email", "mail")]));
        assert!(mapping.is_empty());
        assert_eq!(mapping.username_attribute(), None);

        let mapping = build_mapping::<LocalUser>(&pairs(&[("username", "  "), ("email", "mail")]));
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_username_moves_first_and_rest_keep_order() {
        let mapping = build_mapping::<LocalUser>(&pairs(&[
            ("lastName", "sn"),
            ("email", "mail"),
            ("username", "uid"),
            ("firstName", "givenName"),
        ]));

        let fields: Vec<&str> = mapping.rows().iter().map(|r| r.local_field.as_str()).collect();
        assert_eq!(fields, vec!["username", "lastName", "email", "firstName"]);
        assert_eq!(mapping.username_attribute(), Some("uid"));
        assert_eq!(mapping.rows()[3].accessor_method, "setFirstName");
    }

    #[test]
    fn test_to_directory_entry() {
        let mapping = build_mapping::<LocalUser>(&pairs(&[
            ("username", "uid"),
            ("firstName", "givenName"),
            ("email", "mail"),
        ]));
        let mut user = LocalUser::new("jdoe");
        user.first_name = Some("John".to_string());

        let entry = to_directory_entry(&user, &mapping, "inetOrgPerson");

        assert_eq!(
            entry.get(OBJECT_CLASS_ATTRIBUTE),
            Some(&AttributeValue::List(vec!["inetOrgPerson".into()]))
        );
        assert_eq!(entry.get("uid"), Some(&AttributeValue::Scalar("jdoe".into())));
        assert_eq!(
            entry.get("givenName"),
            Some(&AttributeValue::Scalar("John".into()))
        );
        assert_eq!(entry.get("mail"), Some(&AttributeValue::List(vec![])));
        assert_eq!(entry.dn(), None);
    }

    #[test]
    fn test_distinguished_name() {
        let mut user = LocalUser::new("jdoe");
        assert_eq!(
            distinguished_name(&user, "uid", "ou=people,dc=example"),
            "uid=jdoe,ou=people,dc=example"
        );

        user.dn = Some("cn=John Doe,ou=staff,dc=example".to_string());
        assert_eq!(
            distinguished_name(&user, "uid", "ou=people,dc=example"),
            "cn=John Doe,ou=staff,dc=example"
        );
    }

    #[test]
    fn test_hydrate_end_to_end() {
        let mapping =
            build_mapping::<LocalUser>(&pairs(&[("username", "uid"), ("firstName", "givenName")]));
        let entry = DirectoryEntry::with_dn("uid=jdoe,ou=people,dc=example")
            .with("uid", "jdoe")
            .with("givenName", "John");

        let user = hydrate(LocalUser::default(), &entry, &mapping).unwrap();

        assert_eq!(user.username, "jdoe");
        assert_eq!(user.first_name.as_deref(), Some("John"));
        assert_eq!(user.dn.as_deref(), Some("uid=jdoe,ou=people,dc=example"));
    }

    #[test]
    fn test_hydrate_preserves_password() {
        let mapping = build_mapping::<LocalUser>(&pairs(&[
            ("username", "uid"),
            ("password", "userPassword"),
        ]));
        let entry = person("jdoe", "John").with("userPassword", "{SSHA}directory-hash");

        let user = hydrate(LocalUser::new("jdoe").with_password("secret"), &entry, &mapping)
            .unwrap();
        assert_eq!(user.password.as_deref(), Some("secret"));

        let user = hydrate(LocalUser::new("jdoe"), &entry, &mapping).unwrap();
        assert_eq!(user.password, None);
    }

    #[test]
    fn test_hydrate_decodes_counted_values() {
        let mapping = build_mapping::<LocalUser>(&pairs(&[
            ("username", "uid"),
            ("groups", "memberOf"),
        ]));
        let entry = person("jdoe", "John").with(
            "memberOf",
            AttributeValue::Counted {
                count: Some(2),
                values: vec!["x".into(), "Admins".into(), "Users".into()],
            },
        );

        let user = hydrate(LocalUser::default(), &entry, &mapping).unwrap();
        assert_eq!(user.extended["groups"], json!(["Admins", "Users"]));
    }

    #[test]
    fn test_hydrate_without_dn_is_malformed() {
        let mapping = build_mapping::<LocalUser>(&pairs(&[("username", "uid")]));
        let entry = DirectoryEntry::new().with("uid", "jdoe");

        let err = hydrate(LocalUser::new("old"), &entry, &mapping).unwrap_err();
        assert!(matches!(err, DirBridgeError::MalformedEntry { .. }));
    }
}

// =============================================================================
// Role Resolver Tests
// =============================================================================

#[cfg(test)]
mod role_tests {
    use super::*;

    #[test]
    fn test_role_mapping_union() {
        let mapping = build_role_mapping_table(&[
            RawRoleMapping::new("g1", vec![RoleId::from("A")]),
            RawRoleMapping::new("g1", vec![RoleId::from("B"), RoleId::from("A")]),
        ]);

        let expected: BTreeSet<RoleId> = [RoleId::from("A"), RoleId::from("B")].into();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("g1"), Some(&expected));
    }

    #[test]
    fn test_unmapped_directory_roles_are_dropped() {
        let mapping = build_role_mapping_table(&[RawRoleMapping::new("g1", vec![RoleId::from("R1")])]);

        let roles = map_to_local_roles(&["g1".to_string(), "g2".to_string()], &mapping);
        assert_eq!(roles, [RoleId::from("R1")].into());
    }

    #[test]
    fn test_resolve_directory_role_values() {
        let entry = DirectoryEntry::with_dn("cn=Admins").with(
            "cn",
            AttributeValue::Counted {
                count: Some(1),
                values: vec!["Admins".into()],
            },
        );
        assert_eq!(resolve_directory_role_values(&entry, "cn"), vec!["Admins"]);
        assert!(resolve_directory_role_values(&entry, "ou").is_empty());

        let entry = DirectoryEntry::with_dn("cn=multi").with(
            "cn",
            AttributeValue::Counted {
                count: Some(2),
                values: vec!["x".into(), "Admins".into(), "Users".into()],
            },
        );
        assert_eq!(
            resolve_directory_role_values(&entry, "cn"),
            vec!["Admins", "Users"]
        );
    }

    #[test]
    fn test_apply_roles() {
        let mut user = LocalUser::new("jdoe");
        apply_roles(&mut user, &BTreeSet::new(), &DeferredRoleLookup).unwrap();
        assert!(user.roles.is_empty());

        let ids: BTreeSet<RoleId> = [RoleId::from("1"), RoleId::from("2")].into();
        apply_roles(&mut user, &ids, &DeferredRoleLookup).unwrap();
        assert_eq!(
            user.roles,
            vec![
                RoleRef::deferred(RoleId::from("1")),
                RoleRef::deferred(RoleId::from("2"))
            ]
        );
    }

    #[test]
    fn test_apply_roles_propagates_lookup_failure() {
        struct MissingRoles;

        impl RoleReferenceLookup for MissingRoles {
            fn reference(&self, role_id: &RoleId) -> Result<RoleRef> {
                Err(DirBridgeError::not_found("role", role_id.to_string()))
            }
        }

        let mut user = LocalUser::new("jdoe");
        let ids: BTreeSet<RoleId> = [RoleId::from("9")].into();
        assert!(apply_roles(&mut user, &ids, &MissingRoles).is_err());
        assert!(user.roles.is_empty());
    }
}

// =============================================================================
// Settings Tests
// =============================================================================

#[cfg(test)]
mod settings_tests {
    use super::*;

    #[tokio::test]
    async fn test_load_from_store() {
        let store = MemoryConfigStore::new()
            .with(SERVER_BASE_DN, json!("dc=example"))
            .with(ROLE_ID_ATTRIBUTE, json!("cn"))
            .with(
                ROLE_MAPPING,
                json!([{ "directoryRoleName": "Admins", "localRoleIds": ["ROLE_ADMIN", 5] }]),
            )
            .with(
                USER_MAPPING,
                json!({ "firstName": "givenName", "username": "uid", "email": null }),
            );

        let raw = RawDirectoryConfig::load(&store).await.unwrap();

        assert_eq!(raw.server_base_dn, "dc=example");
        assert_eq!(raw.user_filter, "");
        assert_eq!(
            raw.role_mapping[0].local_role_ids,
            vec![RoleId::from("ROLE_ADMIN"), RoleId::from("5")]
        );
        assert_eq!(
            raw.user_mapping_pairs(),
            pairs(&[("firstName", "givenName"), ("username", "uid"), ("email", "")])
        );
    }

    #[tokio::test]
    async fn test_invalid_settings_are_configuration_errors() {
        let store = MemoryConfigStore::new().with(ROLE_MAPPING, json!("not a list"));
        let err = RawDirectoryConfig::load(&store).await.unwrap_err();
        assert!(matches!(err, DirBridgeError::ConfigurationError { .. }));
    }

    #[test]
    fn test_mapping_config_from_raw() {
        let config = MappingConfig::from_raw::<LocalUser>(&raw_config());

        assert!(config.is_enabled());
        assert_eq!(config.username_attribute(), Some("uid"));
        assert_eq!(config.attributes.len(), 3);
        assert_eq!(
            config.role_mapping.get("Admins"),
            Some(&[RoleId::from("1"), RoleId::from("4")].into())
        );
        assert_eq!(
            config.user_search(),
            SearchParams {
                base_dn: "dc=example".to_string(),
                filter: USER_SEARCH_FILTER.to_string(),
            }
        );
    }
}

// =============================================================================
// Sync Service Tests
// =============================================================================

#[cfg(test)]
mod sync_tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_user_assigns_mapped_roles() {
        let dn = "uid=jdoe,ou=people,dc=example";
        let (directory, service) = service(
            FakeDirectory::default().with_roles(dn, vec![group("Admins"), group("Unmapped")]),
        );

        let user = service
            .sync_user(LocalUser::default(), &person("jdoe", "John"))
            .await
            .unwrap();

        assert_eq!(user.username, "jdoe");
        assert_eq!(user.first_name.as_deref(), Some("John"));
        assert_eq!(user.dn.as_deref(), Some(dn));
        assert!(user.has_role(&RoleId::from("1")));
        assert!(user.has_role(&RoleId::from("4")));
        assert_eq!(user.roles.len(), 2);

        assert_eq!(
            directory.searches(),
            vec![(
                "dc=example".to_string(),
                "(&(objectClass=groupOfNames)(member=uid=jdoe,ou=people,dc=example))".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_sync_user_without_username_mapping_is_disabled() {
        let directory = Arc::new(FakeDirectory::default());
        let service: DirectorySyncService<FakeDirectory, LocalUser> = DirectorySyncService::new(
            directory.clone(),
            Arc::new(DeferredRoleLookup),
            MappingConfig::default(),
        );

        let err = service
            .sync_user(LocalUser::default(), &person("jdoe", "John"))
            .await
            .unwrap_err();
        assert!(matches!(err, DirBridgeError::ConfigurationError { .. }));
        assert!(directory.searches().is_empty());
    }

    #[tokio::test]
    async fn test_sync_user_surfaces_directory_failure() {
        let dn = "uid=jdoe,ou=people,dc=example";
        let (_, service) = service(FakeDirectory::default().failing_for(dn));

        let err = service
            .sync_user(LocalUser::default(), &person("jdoe", "John"))
            .await
            .unwrap_err();
        assert!(err.is_directory_failure());
    }

    #[tokio::test]
    async fn test_sync_all_isolates_failures() {
        let failing_dn = "uid=asmith,ou=people,dc=example";
        let no_username = DirectoryEntry::with_dn("cn=printer,dc=example").with("cn", "printer");
        let directory = FakeDirectory::with_users(vec![
            person("jdoe", "John"),
            person("asmith", "Anna"),
            no_username,
        ])
        .with_roles("uid=jdoe,ou=people,dc=example", vec![group("Sales")])
        .failing_for(failing_dn);
        let (_, service) = service(directory);

        let repository = InMemoryUserRepository::<LocalUser>::new();
        let report = service.sync_all(&repository).await.unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.synced(), 1);
        assert_eq!(report.failed(), 2);

        let failed = &report.outcomes[1];
        assert_eq!(failed.username.as_deref(), Some("asmith"));
        assert_eq!(failed.state, SyncState::Failed);
        assert_eq!(failed.failed_in, Some(SyncState::RoleResolving));
        assert_eq!(
            failed.error.as_deref(),
            Some("Sync failed while role_resolving: Directory unavailable: connection reset")
        );

        let missing = &report.outcomes[2];
        assert_eq!(missing.username, None);
        assert_eq!(missing.failed_in, Some(SyncState::Searching));

        assert_eq!(repository.len().await, 1);
        let saved = repository.find_by_username("jdoe").await.unwrap().unwrap();
        assert!(saved.has_role(&RoleId::from("2")));
        assert!(saved.has_role(&RoleId::from("3")));
    }

    #[tokio::test]
    async fn test_sync_all_reports_save_failures_as_persisting() {
        struct ReadOnlyRepository;

        #[async_trait]
        impl UserRepository<LocalUser> for ReadOnlyRepository {
            async fn find_by_username(&self, _username: &str) -> Result<Option<LocalUser>> {
                Ok(None)
            }

            async fn save(&self, _user: &LocalUser) -> Result<()> {
                Err(DirBridgeError::internal_error("disk full"))
            }
        }

        let (_, service) = service(FakeDirectory::with_users(vec![person("jdoe", "John")]));
        let report = service.sync_all(&ReadOnlyRepository).await.unwrap();

        assert_eq!(report.synced(), 0);
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, SyncState::Failed);
        assert_eq!(outcome.failed_in, Some(SyncState::Persisting));
        assert_eq!(
            outcome.error.as_deref(),
            Some("Sync failed while persisting: Internal error: disk full")
        );
    }

    #[test]
    fn test_sync_state_defaults_to_idle() {
        assert_eq!(SyncState::default(), SyncState::Idle);
        assert_eq!(SyncState::Persisting.to_string(), "persisting");
        assert_eq!(
            serde_json::to_value(SyncState::RoleResolving).unwrap(),
            json!("role_resolving")
        );
    }

    #[tokio::test]
    async fn test_sync_all_updates_existing_users_in_place() {
        let existing = LocalUser::new("jdoe").with_password("secret");
        let existing_id = existing.id;
        let repository = InMemoryUserRepository::with_users(vec![existing]);
        let (_, service) = service(FakeDirectory::with_users(vec![person("jdoe", "Johnny")]));

        let report = service.sync_all(&repository).await.unwrap();
        assert_eq!(report.synced(), 1);

        let saved = repository.find_by_username("jdoe").await.unwrap().unwrap();
        assert_eq!(saved.id, existing_id);
        assert_eq!(saved.password.as_deref(), Some("secret"));
        assert_eq!(saved.first_name.as_deref(), Some("Johnny"));
    }

    #[tokio::test]
    async fn test_find_users_with_no_match() {
        let (_, service) = service(FakeDirectory::default());
        let config = service.config().await;
        let entries = service.find_users(&config.user_search()).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_reconfigure_publishes_new_snapshot() {
        let (_, service) = service(FakeDirectory::default());
        let before = service.config().await;

        let mut raw = raw_config();
        raw.user_mapping = serde_json::from_value(json!({ "email": "mail" })).unwrap();
        let after = service.reconfigure(&raw).await;

        assert!(before.is_enabled());
        assert_eq!(before.attributes.len(), 3);
        assert!(!after.is_enabled());
        assert!(!service.config().await.is_enabled());
        assert_eq!(service.username_attribute().await, None);
    }

    #[tokio::test]
    async fn test_reload_from_store() {
        let (_, service) = service(FakeDirectory::default());
        let store = MemoryConfigStore::new()
            .with(USER_MAPPING, json!({ "username": "sAMAccountName" }))
            .with(SERVER_BASE_DN, json!("dc=corp"));

        let config = service.reload(&store).await.unwrap();
        assert_eq!(config.base_dn, "dc=corp");
        assert_eq!(
            service.username_attribute().await.as_deref(),
            Some("sAMAccountName")
        );
    }

    #[tokio::test]
    async fn test_export_user() {
        let (directory, service) = service(FakeDirectory {
            existing: vec!["uid=jdoe,ou=people,dc=example".to_string()],
            ..FakeDirectory::default()
        });
        let mut user = LocalUser::new("jdoe");
        user.first_name = Some("John".to_string());
        user.email = Some("jdoe@example.com".to_string());

        let dn = service.export_user(&user).await.unwrap();
        assert_eq!(dn, "uid=jdoe,ou=people,dc=example");
        assert!(service.user_exists(&user).await.unwrap());
        assert!(!service.user_exists(&LocalUser::new("other")).await.unwrap());

        let writes = directory.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 1);
        let (written_dn, entry) = &writes[0];
        assert_eq!(written_dn, "uid=jdoe,ou=people,dc=example");
        assert_eq!(
            entry.get("objectClass"),
            Some(&AttributeValue::List(vec!["inetOrgPerson".into()]))
        );
        assert_eq!(
            entry.get("mail"),
            Some(&AttributeValue::Scalar("jdoe@example.com".into()))
        );
    }

    #[tokio::test]
    async fn test_export_requires_username_mapping() {
        let (_, service) = service(FakeDirectory::default());
        service.reconfigure(&RawDirectoryConfig::default()).await;

        let err = service.export_user(&LocalUser::new("jdoe")).await.unwrap_err();
        assert!(matches!(err, DirBridgeError::ConfigurationError { .. }));
    }
}
