//! Builds the fleet manager's collaborators from configuration

use std::sync::Arc;

use eyre::{Result, WrapErr};
use fleetmaster_core::{
    EntitlementGate, FleetManager, FleetManagerArgs, InstanceStore, MemoryStore, SqliteStore,
};
use fleetmaster_driver::{ContainerDriver, DockerDriver};
use fleetmaster_exec::LocalExecutor;

use crate::config::Config;

/// Docker driver running the CLI on this machine
pub fn create_driver(config: &Config) -> Arc<dyn ContainerDriver> {
    let executor = Arc::new(LocalExecutor::new());
    Arc::new(DockerDriver::new(executor, config.docker.clone()))
}

/// SQLite store when a path is configured, otherwise in memory
pub fn create_store(config: &Config) -> Result<Box<dyn InstanceStore>> {
    match &config.store.path {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .wrap_err_with(|| format!("creating {}", parent.display()))?;
            }
            let store = SqliteStore::open(path)
                .wrap_err_with(|| format!("opening store {}", path.display()))?;
            tracing::info!(path = %path.display(), "using sqlite store");
            Ok(Box::new(store))
        }
        None => {
            tracing::warn!("no store path configured, server records will not survive restarts");
            Ok(Box::new(MemoryStore::new()))
        }
    }
}

/// Start a fleet manager wired to Docker and the configured store
pub async fn create_manager(config: &Config) -> Result<FleetManager> {
    let entitlement = EntitlementGate::from_config(&config.entitlement)?;
    let args = FleetManagerArgs {
        config: config.manager_config(),
        driver: create_driver(config),
        store: create_store(config)?,
        entitlement,
        listen_heartbeats: true,
    };
    FleetManager::start(args)
        .await
        .wrap_err("starting fleet manager")
}
