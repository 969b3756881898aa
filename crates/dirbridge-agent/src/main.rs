//! DirBridge agent - runs one directory user sync batch

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::Settings;
use dirbridge_directory::SyncReport;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let settings = Settings::load().context("Failed to load configuration")?;

    info!("Starting DirBridge agent v{}", env!("CARGO_PKG_VERSION"));

    let report = run_sync(&settings).await?;

    if report.failed() > 0 {
        warn!("{} users failed to sync", report.failed());
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render sync report")?
    );
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dirbridge=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

#[cfg(feature = "ldap")]
async fn run_sync(settings: &Settings) -> Result<SyncReport> {
    use std::sync::Arc;

    use dirbridge_core::{DeferredRoleLookup, LocalUser};
    use dirbridge_directory::{
        DirectorySyncService, InMemoryUserRepository, LdapDirectoryClient, MappingConfig,
    };

    info!("Using directory server {}", settings.ldap.server_url);
    let client = Arc::new(LdapDirectoryClient::new(settings.ldap.connection()));

    let service = DirectorySyncService::<_, LocalUser>::new(
        client,
        Arc::new(DeferredRoleLookup),
        MappingConfig::default(),
    );
    service
        .reload(&settings.mapping)
        .await
        .context("Failed to load directory mapping")?;

    // Report-only host: synced users live for this run and are described by
    // the printed report. Hosts with a user store pass their own repository.
    let repository = InMemoryUserRepository::<LocalUser>::new();
    service
        .sync_all(&repository)
        .await
        .context("Directory sync failed")
}

#[cfg(not(feature = "ldap"))]
async fn run_sync(_settings: &Settings) -> Result<SyncReport> {
    anyhow::bail!("LDAP support not enabled. Compile with --features ldap")
}
