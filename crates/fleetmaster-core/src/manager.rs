//! `FleetManager`: the façade every outer surface talks to
//!
//! Owns the registry, the background workers, and the shutdown sequence.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use fleetmaster_api::events::FleetEvent;
use fleetmaster_api::heartbeat::HeartbeatReport;
use fleetmaster_api::responses::{FleetActionResponse, ReconcileSummary};
use fleetmaster_driver::{ContainerDriver, DriverError};

use crate::actor::RegistryHandle;
use crate::allocation::{Allocation, Allocator};
use crate::config::FleetManagerConfig;
use crate::entitlement::EntitlementGate;
use crate::error::CoreError;
use crate::heartbeat::{HeartbeatListener, HeartbeatOutcome, apply_report};
use crate::instance::{InstanceHistory, ServerInstance};
use crate::ports::PortPool;
use crate::provision::{ProvisionRequest, Provisioner};
use crate::reaper::{Reaper, SweepReport};
use crate::reconciler::Reconciler;
use crate::state::ServerState;
use crate::store::InstanceStore;

/// Event broadcast channel capacity
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Collaborators and settings for `FleetManager::start`
pub struct FleetManagerArgs {
    pub config: FleetManagerConfig,
    pub driver: Arc<dyn ContainerDriver>,
    pub store: Box<dyn InstanceStore>,
    pub entitlement: EntitlementGate,
    /// Run the heartbeat listener
    pub listen_heartbeats: bool,
}

/// A request to place a party
#[derive(Debug, Clone, Default)]
pub struct AllocationRequest {
    pub party_size: u32,
    /// Player identity for the entitlement check
    pub identity: Option<String>,
}

/// A removed server and what happened to its container
#[derive(Debug, Clone)]
pub struct RemovedServer {
    pub instance: ServerInstance,
    /// Set when the container could not be torn down
    pub teardown_error: Option<DriverError>,
}

struct Inner {
    config: FleetManagerConfig,
    registry: RegistryHandle,
    provisioner: Arc<Provisioner>,
    allocator: Allocator,
    reaper: Arc<Reaper>,
    reconciler: Arc<Reconciler>,
    entitlement: EntitlementGate,
    accepting: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    heartbeat_addr: Option<SocketAddr>,
}

/// Fleet manager handle; cheap to clone
#[derive(Clone)]
pub struct FleetManager {
    inner: Arc<Inner>,
}

impl FleetManager {
    /// Load the registry, reconcile, and start the background workers
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the store cannot be
    /// read, or the heartbeat port cannot be bound
    pub async fn start(args: FleetManagerArgs) -> Result<Self, CoreError> {
        let FleetManagerArgs {
            config,
            driver,
            store,
            entitlement,
            listen_heartbeats,
        } = args;
        config.validate()?;

        let instances = store.load_live()?;
        info!(
            fleet = %config.fleet.name,
            store = store.store_type(),
            driver = driver.driver_type(),
            live = instances.len(),
            "starting fleet manager"
        );

        let ports = PortPool::resume_after(
            config.fleet.port_pool_start,
            config.fleet.port_pool_end,
            instances.iter().map(|i| i.port),
        );
        let interrupted: Vec<_> = instances
            .iter()
            .filter(|i| i.state == ServerState::Terminating)
            .cloned()
            .collect();
        let registry = RegistryHandle::spawn(store, instances, EVENT_CHANNEL_CAPACITY);

        let provisioner = Arc::new(Provisioner::new(
            registry.clone(),
            driver,
            ports,
            config.fleet.clone(),
            config.container.clone(),
        ));
        let allocator = Allocator::new(
            registry.clone(),
            Arc::clone(&provisioner),
            config.fleet.overfill_fallback,
        );
        let reaper = Arc::new(Reaper::new(
            registry.clone(),
            Arc::clone(&provisioner),
            config.heartbeat.stale_after(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            registry.clone(),
            Arc::clone(&provisioner),
            config.fleet.clone(),
        ));

        if !interrupted.is_empty() {
            reaper.finish_interrupted(&interrupted).await;
        }
        if config.reconciler.run_on_startup {
            reconciler.reconcile().await;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

        let mut heartbeat_addr = None;
        if listen_heartbeats {
            let bound = HeartbeatListener::bind(&config.heartbeat, registry.clone()).await;
            let listener = match bound {
                Ok(listener) => listener,
                Err(e) => {
                    registry.stop().await;
                    return Err(e);
                }
            };
            heartbeat_addr = listener.local_addr().ok();
            workers.push((
                "heartbeat",
                tokio::spawn(listener.run(shutdown_rx.clone())),
            ));
        }

        if config.reaper.enabled {
            workers.push((
                "reaper",
                tokio::spawn(
                    Arc::clone(&reaper).run(config.reaper.interval(), shutdown_rx.clone()),
                ),
            ));
        }

        if let Some(period) = config.reconciler.interval() {
            workers.push((
                "reconciler",
                tokio::spawn(Arc::clone(&reconciler).run(period, shutdown_rx.clone())),
            ));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                registry,
                provisioner,
                allocator,
                reaper,
                reconciler,
                entitlement,
                accepting: AtomicBool::new(true),
                shutdown_tx,
                workers: Mutex::new(workers),
                heartbeat_addr,
            }),
        })
    }

    fn ensure_accepting(&self) -> Result<(), CoreError> {
        if self.inner.accepting.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::ShuttingDown)
        }
    }

    #[must_use]
    pub fn config(&self) -> &FleetManagerConfig {
        &self.inner.config
    }

    /// Address the heartbeat listener is bound to
    #[must_use]
    pub fn heartbeat_addr(&self) -> Option<SocketAddr> {
        self.inner.heartbeat_addr
    }

    /// Check if the manager still takes requests
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Get an event receiver
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.inner.registry.subscribe()
    }

    /// Place a party on a server
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown`, `JoiningDisabled`, `InvalidPartySize`, an
    /// entitlement rejection, or the allocation failure
    #[instrument(skip(self, request), fields(party_size = request.party_size))]
    pub async fn allocate(&self, request: AllocationRequest) -> Result<Allocation, CoreError> {
        self.ensure_accepting()?;
        let fleet = &self.inner.config.fleet;

        if !fleet.allow_server_joining {
            return Err(CoreError::JoiningDisabled);
        }
        let max = fleet.party_limit();
        if request.party_size > max {
            return Err(CoreError::InvalidPartySize {
                size: request.party_size,
                max,
            });
        }

        self.inner
            .entitlement
            .admit(request.identity.as_deref())
            .await?;
        self.inner.allocator.allocate(request.party_size).await
    }

    /// Provision a server outside of allocation
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` or the provisioning failure
    pub async fn create_server(
        &self,
        request: ProvisionRequest,
    ) -> Result<ServerInstance, CoreError> {
        self.ensure_accepting()?;
        self.inner.provisioner.create_server(request).await
    }

    /// Tear down the server on `port` and soft-delete its record
    ///
    /// The record is deleted even when the container could not be removed;
    /// the driver failure is reported in the result.
    ///
    /// # Errors
    ///
    /// Returns `ServerNotFound` if no live server uses the port
    #[instrument(skip(self))]
    pub async fn remove_server(&self, port: u16) -> Result<RemovedServer, CoreError> {
        self.ensure_accepting()?;
        let registry = &self.inner.registry;

        let current = registry.by_port(port).await?;
        let instance = registry
            .begin_teardown(current.id, false)
            .await?
            .unwrap_or(current);

        let teardown_error = self.inner.provisioner.teardown(&instance).await.err();
        if let Some(e) = &teardown_error {
            error!(server_id = %instance.server_id, error = %e, "failed to tear down container");
        }

        let instance = registry.soft_delete(instance.id, "removed").await?;
        Ok(RemovedServer {
            instance,
            teardown_error,
        })
    }

    /// Every live server, ordered by port
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is unavailable
    pub async fn list_servers(&self) -> Result<Vec<ServerInstance>, CoreError> {
        let mut servers = self.inner.registry.list().await?;
        servers.sort_by_key(|s| s.port);
        Ok(servers)
    }

    /// # Errors
    ///
    /// Returns `ServerNotFound` if no live server uses the port
    pub async fn server_by_port(&self, port: u16) -> Result<ServerInstance, CoreError> {
        self.inner.registry.by_port(port).await
    }

    /// # Errors
    ///
    /// Returns `ServerNotFound` if no live server has the id
    pub async fn server_by_id(&self, server_id: &str) -> Result<ServerInstance, CoreError> {
        self.inner.registry.by_server_id(server_id).await
    }

    /// A server and its occupancy log, soft-deleted servers included
    ///
    /// # Errors
    ///
    /// Returns `ServerNotFound` if no record ever had the id
    pub async fn history(&self, server_id: &str) -> Result<InstanceHistory, CoreError> {
        self.inner.registry.history(server_id).await
    }

    /// Apply a heartbeat delivered outside the TCP listener
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` once shutdown has started
    pub async fn report_heartbeat(
        &self,
        report: &HeartbeatReport,
    ) -> Result<HeartbeatOutcome, CoreError> {
        self.ensure_accepting()?;
        Ok(apply_report(&self.inner.registry, report).await)
    }

    /// Operator overwrite of a server's player count
    ///
    /// # Errors
    ///
    /// Returns `ServerNotFound` if no live server uses the port
    pub async fn override_player_count(
        &self,
        port: u16,
        player_count: u32,
    ) -> Result<ServerInstance, CoreError> {
        self.ensure_accepting()?;
        warn!(port, player_count, "player count overwritten by operator");
        self.inner
            .registry
            .override_player_count(port, player_count)
            .await
    }

    /// Run a reconciliation pass now
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` once shutdown has started
    pub async fn reconcile(&self) -> Result<ReconcileSummary, CoreError> {
        self.ensure_accepting()?;
        Ok(self.inner.reconciler.reconcile().await)
    }

    /// Run a reaper sweep now
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` once shutdown has started
    pub async fn sweep(&self) -> Result<SweepReport, CoreError> {
        self.ensure_accepting()?;
        Ok(self.inner.reaper.sweep().await)
    }

    /// Start every live server's container
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` or a registry failure; per-container failures
    /// are collected in the response
    pub async fn start_all(&self) -> Result<FleetActionResponse, CoreError> {
        self.ensure_accepting()?;
        let driver = self.inner.provisioner.driver();
        let mut response = FleetActionResponse::default();

        for server in self.inner.registry.list().await? {
            let Some(container_id) = server.container_id.as_deref() else {
                continue;
            };
            match driver.start(container_id).await {
                Ok(()) => response.affected += 1,
                Err(e) => response.errors.push(format!("{}: {e}", server.server_id)),
            }
        }
        info!(affected = response.affected, errors = response.errors.len(), "started fleet");
        Ok(response)
    }

    /// Stop every managed container
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` once shutdown has started
    pub async fn stop_all(&self) -> Result<FleetActionResponse, CoreError> {
        self.ensure_accepting()?;
        Ok(self.stop_containers().await)
    }

    async fn stop_containers(&self) -> FleetActionResponse {
        let driver = self.inner.provisioner.driver();
        let grace = self.inner.provisioner.template().stop_grace();
        let mut response = FleetActionResponse::default();

        let containers = match driver.list_managed().await {
            Ok(containers) => containers,
            Err(e) => {
                response.errors.push(format!("list containers: {e}"));
                return response;
            }
        };
        for container in containers.iter().filter(|c| c.is_running()) {
            match driver.stop(&container.id, grace).await {
                Ok(()) => response.affected += 1,
                Err(e) => response.errors.push(format!("{}: {e}", container.id)),
            }
        }
        info!(affected = response.affected, errors = response.errors.len(), "stopped fleet");
        response
    }

    /// Stop accepting work, stop the workers, and flush the registry
    ///
    /// Workers that do not finish within `timeout` are aborted. Calling this
    /// more than once is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry could not be flushed
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), CoreError> {
        if !self.inner.accepting.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!(timeout_ms = timeout.as_millis(), "fleet manager shutting down");

        let _ = self.inner.shutdown_tx.send(true);

        let workers = std::mem::take(&mut *self.inner.workers.lock().await);
        let deadline = tokio::time::Instant::now() + timeout;
        for (name, mut handle) in workers {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => info!(worker = name, "worker stopped"),
                Ok(Err(e)) => error!(worker = name, error = %e, "worker failed"),
                Err(_) => {
                    warn!(worker = name, "worker did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        if self.inner.config.fleet.stop_containers_on_shutdown {
            self.stop_containers().await;
        }

        let flushed = self.inner.registry.flush().await;
        self.inner.registry.stop().await;
        flushed?;

        info!("fleet manager stopped");
        Ok(())
    }
}
