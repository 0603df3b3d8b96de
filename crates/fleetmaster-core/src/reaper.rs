//! Idle-server reaper
//!
//! Periodically tears down empty, non-standby servers. The registry record
//! is always soft-deleted, even when the container could not be removed;
//! reconciliation picks up any container left behind.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::actor::RegistryHandle;
use crate::instance::ServerInstance;
use crate::provision::Provisioner;

/// Result of one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Servers marked unresponsive for missing heartbeats
    pub marked_unresponsive: usize,
    /// Server ids removed as idle
    pub reaped: Vec<String>,
    pub errors: Vec<String>,
}

/// Removes idle servers
pub struct Reaper {
    registry: RegistryHandle,
    provisioner: Arc<Provisioner>,
    stale_after: Option<Duration>,
}

impl Reaper {
    #[must_use]
    pub fn new(
        registry: RegistryHandle,
        provisioner: Arc<Provisioner>,
        stale_after: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            provisioner,
            stale_after,
        }
    }

    /// Run one sweep
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        if let Some(stale_after) = self.stale_after
            && let Ok(stale_after) = chrono::Duration::from_std(stale_after)
        {
            match self.registry.mark_stale(Utc::now() - stale_after).await {
                Ok(marked) => report.marked_unresponsive = marked.len(),
                Err(e) => report.errors.push(format!("staleness check: {e}")),
            }
        }

        let instances = match self.registry.list().await {
            Ok(instances) => instances,
            Err(e) => {
                error!(error = %e, "reaper could not list servers");
                report.errors.push(e.to_string());
                return report;
            }
        };

        for candidate in instances
            .iter()
            .filter(|i| !i.is_standby && i.player_count == 0)
        {
            // Re-checked atomically: a heartbeat may have arrived since the listing
            let instance = match self.registry.begin_teardown(candidate.id, true).await {
                Ok(Some(instance)) => instance,
                Ok(None) => continue,
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!(server_id = %candidate.server_id, error = %e, "cannot reap server");
                    report.errors.push(format!("{}: {e}", candidate.server_id));
                    continue;
                }
            };

            self.retire(&instance, "idle", &mut report).await;
        }

        debug!(
            reaped = report.reaped.len(),
            unresponsive = report.marked_unresponsive,
            errors = report.errors.len(),
            "reaper sweep finished"
        );
        report
    }

    /// Finish teardowns a previous run left in `Terminating`
    pub async fn finish_interrupted(&self, instances: &[ServerInstance]) -> SweepReport {
        let mut report = SweepReport::default();
        for instance in instances {
            info!(server_id = %instance.server_id, "finishing interrupted teardown");
            self.retire(instance, "teardown interrupted", &mut report)
                .await;
        }
        report
    }

    /// Remove the container, then soft-delete the record regardless
    async fn retire(&self, instance: &ServerInstance, reason: &str, report: &mut SweepReport) {
        if let Err(e) = self.provisioner.teardown(instance).await {
            error!(
                server_id = %instance.server_id,
                error = %e,
                "failed to remove server container"
            );
            report.errors.push(format!("{}: {e}", instance.server_id));
        }

        match self.registry.soft_delete(instance.id, reason).await {
            Ok(_) => {
                info!(
                    server_id = %instance.server_id,
                    port = instance.port,
                    reason,
                    "server reaped"
                );
                report.reaped.push(instance.server_id.clone());
            }
            Err(e) => {
                error!(
                    server_id = %instance.server_id,
                    error = %e,
                    "failed to delete server record"
                );
                report.errors.push(format!("{}: {e}", instance.server_id));
            }
        }
    }

    /// Sweep every `period` until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = period.as_secs(), "reaper started");

        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("reaper stopped");
    }
}
