//! Registry and runtime reconciliation
//!
//! Brings the registry and the container runtime back into agreement:
//! containers no record claims are removed, records whose container is
//! missing or dead are soft-deleted (and optionally replaced), and an empty
//! runtime is re-seeded with the initial standby fleet.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use fleetmaster_api::responses::ReconcileSummary;
use fleetmaster_driver::ContainerInfo;

use crate::actor::RegistryHandle;
use crate::config::FleetConfig;
use crate::instance::ServerInstance;
use crate::provision::{ProvisionRequest, Provisioner};
use crate::state::ServerState;

/// Reconciles the registry against the container runtime
pub struct Reconciler {
    registry: RegistryHandle,
    provisioner: Arc<Provisioner>,
    fleet: FleetConfig,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        registry: RegistryHandle,
        provisioner: Arc<Provisioner>,
        fleet: FleetConfig,
    ) -> Self {
        Self {
            registry,
            provisioner,
            fleet,
        }
    }

    fn owns(&self, instance: &ServerInstance, container: &ContainerInfo) -> bool {
        instance
            .container_id
            .as_deref()
            .is_some_and(|id| container.matches_id(id))
            || container.has_name(&self.provisioner.template().container_name(instance))
    }

    /// Run one reconciliation pass
    ///
    /// Individual failures are collected into the summary; the pass keeps
    /// going.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let driver = self.provisioner.driver();

        // Records before containers: a record inserted after this snapshot
        // gets its container after the listing, so it can never look dead
        let records = match self.registry.list().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "cannot list server records");
                summary.errors.push(format!("list records: {e}"));
                return summary;
            }
        };
        // Without an authoritative listing nothing can be compared
        let containers = match driver.list_managed().await {
            Ok(containers) => containers,
            Err(e) => {
                error!(error = %e, "cannot list managed containers");
                summary.errors.push(format!("list containers: {e}"));
                return summary;
            }
        };
        // Every listed container had its record inserted before the listing
        let owners = match self.registry.list().await {
            Ok(owners) => owners,
            Err(e) => {
                error!(error = %e, "cannot list server records");
                summary.errors.push(format!("list records: {e}"));
                return summary;
            }
        };

        let bootstrap = self.fleet.create_initial_servers
            && self.fleet.initial_servers > 0
            && (records.is_empty() || containers.is_empty());

        // Orphans: containers no record claims
        for container in &containers {
            if owners.iter().any(|r| self.owns(r, container)) {
                continue;
            }

            let result = if self.fleet.allow_server_deletion {
                driver.remove(&container.id, true).await
            } else if container.is_running() {
                driver
                    .stop(&container.id, self.provisioner.template().stop_grace())
                    .await
            } else {
                continue;
            };

            match result {
                Ok(()) => {
                    info!(
                        container_id = %container.id,
                        names = ?container.names,
                        "orphan container removed"
                    );
                    summary.orphans_removed += 1;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(
                        container_id = %container.id,
                        error = %e,
                        "failed to remove orphan container"
                    );
                    summary.errors.push(format!("orphan {}: {e}", container.id));
                }
            }
        }

        // Records whose container is missing or no longer running
        for record in &records {
            // Container creation or teardown is still in flight
            if record.state == ServerState::Provisioning || record.state.is_stopping() {
                continue;
            }

            let container = containers.iter().find(|c| self.owns(record, c));
            if container.is_some_and(ContainerInfo::is_running) {
                continue;
            }

            // The reaper or an operator may have taken it since the snapshot
            match self.registry.by_server_id(&record.server_id).await {
                Ok(latest) if latest.id != record.id || latest.state.is_stopping() => continue,
                Ok(_) => {}
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    summary.errors.push(format!("{}: {e}", record.server_id));
                    continue;
                }
            }

            if let Some(dead) = container
                && self.fleet.allow_server_deletion
                && let Err(e) = driver.remove(&dead.id, true).await
                && !e.is_not_found()
            {
                warn!(container_id = %dead.id, error = %e, "failed to remove dead container");
                summary.errors.push(format!("dead {}: {e}", dead.id));
            }

            let reason = if container.is_some() {
                "container stopped"
            } else {
                "container missing"
            };
            match self.registry.soft_delete(record.id, reason).await {
                Ok(_) => {
                    warn!(
                        server_id = %record.server_id,
                        port = record.port,
                        reason,
                        "stale record removed"
                    );
                    summary.stale_records_removed += 1;
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    summary.errors.push(format!("{}: {e}", record.server_id));
                    continue;
                }
            }

            if bootstrap || !self.fleet.replace_dead_servers {
                continue;
            }
            let request = ProvisionRequest {
                standby: record.is_standby,
                port: Some(record.port),
            };
            match self.provisioner.create_server(request).await {
                Ok(replacement) => {
                    info!(
                        replaced = %record.server_id,
                        server_id = %replacement.server_id,
                        port = replacement.port,
                        "dead server replaced"
                    );
                    summary.replacements_provisioned += 1;
                }
                Err(e) => {
                    warn!(
                        server_id = %record.server_id,
                        error = %e,
                        "failed to replace dead server"
                    );
                    summary.errors.push(format!("replace {}: {e}", record.server_id));
                }
            }
        }

        if bootstrap {
            let live = self.registry.list().await.map(|r| r.len()).unwrap_or(0);
            let missing = self.fleet.initial_servers.saturating_sub(live);
            if missing > 0 {
                info!(count = missing, "seeding initial standby fleet");
            }
            for _ in 0..missing {
                match self.provisioner.create_server(ProvisionRequest::standby()).await {
                    Ok(_) => summary.bootstrapped += 1,
                    Err(e) => {
                        warn!(error = %e, "failed to provision initial server");
                        summary.errors.push(format!("bootstrap: {e}"));
                        if e.is_rejection() {
                            break;
                        }
                    }
                }
            }
        }

        info!(
            orphans_removed = summary.orphans_removed,
            stale_records_removed = summary.stale_records_removed,
            replacements = summary.replacements_provisioned,
            bootstrapped = summary.bootstrapped,
            errors = summary.errors.len(),
            "reconciliation finished"
        );
        summary
    }

    /// Reconcile every `period` until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = period.as_secs(), "reconciler started");

        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.reconcile().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("reconciler stopped");
    }
}
