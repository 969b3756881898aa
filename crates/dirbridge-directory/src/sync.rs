//! Directory sync service - searches, hydrates and assigns roles
//!
//! The service:
//! - Holds the active mapping config as an immutable snapshot and swaps it
//!   wholesale on `reconfigure`
//! - Hydrates local users from directory entries and resolves their roles
//! - Runs batches where one user's failure never stops the others
//! - Exports local users back to the directory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use dirbridge_core::{
    ConfigStore, DirBridgeError, DirectoryEntry, DirectorySearchClient, DirectoryUser, Result,
    RoleReferenceLookup, UserRepository,
};

use crate::mapper::{build_mapping, distinguished_name, hydrate, to_directory_entry, AttributeMapping};
use crate::roles::{
    apply_roles, build_role_mapping_table, map_to_local_roles, resolve_directory_role_values,
    role_search_filter, RoleMapping,
};
use crate::settings::RawDirectoryConfig;

/// Stages a single user goes through during sync. `Persisting` is only
/// entered by batch syncs, which save every synced user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Searching,
    Hydrating,
    RoleResolving,
    Persisting,
    Done,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Searching => write!(f, "searching"),
            Self::Hydrating => write!(f, "hydrating"),
            Self::RoleResolving => write!(f, "role_resolving"),
            Self::Persisting => write!(f, "persisting"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Base DN and filter of a directory search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub base_dn: String,
    pub filter: String,
}

/// Mapping settings used by one sync cycle
#[derive(Debug, Clone)]
pub struct MappingConfig<F> {
    pub base_dn: String,
    pub user_filter: String,
    pub role_filter: String,
    pub role_id_attribute: String,
    pub role_user_id_attribute: String,
    pub export_base_dn: String,
    pub export_object_class: String,
    pub role_mapping: RoleMapping,
    pub attributes: AttributeMapping<F>,
}

impl<F> Default for MappingConfig<F> {
    fn default() -> Self {
        Self {
            base_dn: String::new(),
            user_filter: String::new(),
            role_filter: String::new(),
            role_id_attribute: String::new(),
            role_user_id_attribute: String::new(),
            export_base_dn: String::new(),
            export_object_class: String::new(),
            role_mapping: RoleMapping::default(),
            attributes: AttributeMapping::default(),
        }
    }
}

impl<F> MappingConfig<F> {
    /// Build the mapping config for record type `U`
    pub fn from_raw<U>(raw: &RawDirectoryConfig) -> Self
    where
        U: DirectoryUser<Field = F>,
    {
        Self {
            base_dn: raw.server_base_dn.clone(),
            user_filter: raw.user_filter.clone(),
            role_filter: raw.role_filter.clone(),
            role_id_attribute: raw.role_id_attribute.clone(),
            role_user_id_attribute: raw.role_user_id_attribute.clone(),
            export_base_dn: raw.export_user_base_dn.clone(),
            export_object_class: raw.export_user_class.clone(),
            role_mapping: build_role_mapping_table(&raw.role_mapping),
            attributes: build_mapping::<U>(&raw.user_mapping_pairs()),
        }
    }

    /// Sync and export need a username mapping
    pub fn is_enabled(&self) -> bool {
        !self.attributes.is_empty()
    }

    pub fn username_attribute(&self) -> Option<&str> {
        self.attributes.username_attribute()
    }

    pub fn user_search(&self) -> SearchParams {
        SearchParams {
            base_dn: self.base_dn.clone(),
            filter: self.user_filter.clone(),
        }
    }

    fn require_enabled(&self) -> Result<&str> {
        self.username_attribute().ok_or_else(|| {
            DirBridgeError::configuration("Directory sync is disabled: no username mapping")
        })
    }
}

/// Result for one directory entry of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSyncOutcome {
    pub dn: Option<String>,
    pub username: Option<String>,
    /// `Done` or `Failed`
    pub state: SyncState,
    /// Stage that was running when the sync failed
    pub failed_in: Option<SyncState>,
    /// Rendered [`DirBridgeError::SyncFailed`]
    pub error: Option<String>,
}

/// Result of a sync batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub outcomes: Vec<UserSyncOutcome>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn synced(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == SyncState::Done)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == SyncState::Failed)
            .count()
    }
}

/// Sync of local users with a directory service
pub struct DirectorySyncService<C, U>
where
    C: DirectorySearchClient,
    U: DirectoryUser,
{
    client: Arc<C>,
    role_lookup: Arc<dyn RoleReferenceLookup>,
    active: RwLock<Arc<MappingConfig<U::Field>>>,
}

impl<C, U> DirectorySyncService<C, U>
where
    C: DirectorySearchClient + 'static,
    U: DirectoryUser + 'static,
{
    pub fn new(
        client: Arc<C>,
        role_lookup: Arc<dyn RoleReferenceLookup>,
        config: MappingConfig<U::Field>,
    ) -> Self {
        Self {
            client,
            role_lookup,
            active: RwLock::new(Arc::new(config)),
        }
    }

    /// The active mapping config. Callers keep the snapshot for the whole
    /// operation, so a concurrent `reconfigure` never mixes old and new rows.
    pub async fn config(&self) -> Arc<MappingConfig<U::Field>> {
        self.active.read().await.clone()
    }

    /// Rebuild the mapping config from raw settings and publish it
    #[instrument(skip_all)]
    pub async fn reconfigure(&self, raw: &RawDirectoryConfig) -> Arc<MappingConfig<U::Field>> {
        let config = Arc::new(MappingConfig::from_raw::<U>(raw));

        if config.is_enabled() {
            info!(
                "Directory mapping updated: {} attributes, {} role mappings",
                config.attributes.len(),
                config.role_mapping.len()
            );
        } else {
            warn!("Directory mapping has no username attribute; sync and export are disabled");
        }

        *self.active.write().await = config.clone();
        config
    }

    /// Load the raw settings from a store and [`reconfigure`](Self::reconfigure)
    pub async fn reload(&self, store: &dyn ConfigStore) -> Result<Arc<MappingConfig<U::Field>>> {
        let raw = RawDirectoryConfig::load(store).await?;
        Ok(self.reconfigure(&raw).await)
    }

    /// Directory attribute mapped to the username, if sync is enabled
    pub async fn username_attribute(&self) -> Option<String> {
        self.config().await.username_attribute().map(str::to_owned)
    }

    #[instrument(skip(self))]
    pub async fn find_users(&self, params: &SearchParams) -> Result<Vec<DirectoryEntry>> {
        let entries = self.client.search(&params.base_dn, &params.filter).await?;
        debug!("Found {} user entries", entries.len());
        Ok(entries)
    }

    /// Hydrate `user` from `entry` and assign the roles the directory grants
    pub async fn sync_user(&self, user: U, entry: &DirectoryEntry) -> Result<U> {
        let config = self.config().await;
        let mut state = SyncState::default();
        self.sync_user_with(user, entry, &config, &mut state).await
    }

    /// Hydrate and resolve roles. Leaves `state` at the stage that was
    /// running when an error occurred.

    async fn sync_user_with(
        &self,
        user: U,
        entry: &DirectoryEntry,
        config: &MappingConfig<U::Field>,
        state: &mut SyncState,
    ) -> Result<U> {
        config.require_enabled()?;

        *state = SyncState::Hydrating;
        let mut user = hydrate(user, entry, &config.attributes)?;

        *state = SyncState::RoleResolving;
        let user_dn = user.dn().unwrap_or_default().to_string();
        let filter = role_search_filter(
            &config.role_filter,
            &config.role_user_id_attribute,
            &user_dn,
        );
        let role_entries = self.client.search(&config.base_dn, &filter).await?;

        let directory_roles: Vec<String> = role_entries
            .iter()
            .flat_map(|e| resolve_directory_role_values(e, &config.role_id_attribute))
            .collect();
        let local_roles = map_to_local_roles(&directory_roles, &config.role_mapping);
        apply_roles(&mut user, &local_roles, self.role_lookup.as_ref())?;

        debug!(
            "Synced {} ({} directory roles, {} local roles)",
            user_dn,
            directory_roles.len(),
            local_roles.len()
        );
        Ok(user)
    }

    /// Sync every user the configured search returns and save them through
    /// `repository`. A failure is recorded on that user's outcome only.
    #[instrument(skip_all)]
    pub async fn sync_all<R>(&self, repository: &R) -> Result<SyncReport>
    where
        R: UserRepository<U>,
        U: Default,
    {
        let started_at = Utc::now();
        let config = self.config().await;
        let username_attribute = config.require_enabled()?.to_string();

        info!("Starting directory user sync");
        let entries = self.find_users(&config.user_search()).await?;

        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in &entries {
            let username = entry
                .decode(&username_attribute)
                .and_then(|value| value.into_values().into_iter().next());

            let mut state = SyncState::Searching;
            let result = match &username {
                Some(username) => {
                    self.sync_one(repository, entry, username, &config, &mut state)
                        .await
                }
                None => Err(DirBridgeError::malformed_entry(
                    entry.dn().unwrap_or_default(),
                    format!("missing username attribute '{}'", username_attribute),
                )),
            };

            let outcome = match result {
                Ok(()) => UserSyncOutcome {
                    dn: entry.dn.clone(),
                    username,
                    state: SyncState::Done,
                    failed_in: None,
                    error: None,
                },
                Err(e) => {
                    let failure = DirBridgeError::sync_failed(state.to_string(), e.to_string());
                    error!("{} ({})", failure, entry.dn().unwrap_or("<no dn>"));
                    UserSyncOutcome {
                        dn: entry.dn.clone(),
                        username,
                        state: SyncState::Failed,
                        failed_in: Some(state),
                        error: Some(failure.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let completed_at = Utc::now();
        let report = SyncReport {
            outcomes,
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
        };

        info!(
            "Sync completed: {} synced, {} failed",
            report.synced(),
            report.failed()
        );
        Ok(report)
    }

    async fn sync_one<R>(
        &self,
        repository: &R,
        entry: &DirectoryEntry,
        username: &str,
        config: &MappingConfig<U::Field>,
        state: &mut SyncState,
    ) -> Result<()>
    where
        R: UserRepository<U>,
        U: Default,
    {
        let user = repository
            .find_by_username(username)
            .await?
            .unwrap_or_default();
        let user = self.sync_user_with(user, entry, config, state).await?;

        *state = SyncState::Persisting;
        repository.save(&user).await?;

        *state = SyncState::Done;
        Ok(())
    }

    /// Write `user` to the directory and return the DN it was written at
    #[instrument(skip_all, fields(username = %user.username()))]
    pub async fn export_user(&self, user: &U) -> Result<String> {
        let config = self.config().await;
        let username_attribute = config.require_enabled()?;

        let dn = distinguished_name(user, username_attribute, &config.export_base_dn);
        let entry = to_directory_entry(user, &config.attributes, &config.export_object_class);

        self.client.write(&dn, &entry).await?;
        info!("Exported user to {}", dn);
        Ok(dn)
    }

    /// Whether the directory already holds an entry for `user`
    pub async fn user_exists(&self, user: &U) -> Result<bool> {
        let config = self.config().await;
        let username_attribute = config.require_enabled()?;
        let dn = distinguished_name(user, username_attribute, &config.export_base_dn);
        self.client.exists(&dn).await
    }
}
