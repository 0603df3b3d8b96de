use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use fleetmaster_api::heartbeat::HeartbeatReport;
use fleetmaster_core::*;
use fleetmaster_driver::{
    ContainerDriver, ContainerInfo, ContainerSpec, ContainerState, DriverError,
};

// Mock implementations
#[derive(Default)]
struct MockDriver {
    containers: Mutex<Vec<ContainerInfo>>,
    specs: Mutex<Vec<ContainerSpec>>,
    removed: Mutex<Vec<String>>,
    stopped: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    fail_create: AtomicBool,
    fail_remove: AtomicBool,
    list_delay: Mutex<Option<Duration>>,
}

impl MockDriver {
    fn containers(&self) -> Vec<ContainerInfo> {
        self.containers.lock().unwrap().clone()
    }

    fn running(&self) -> usize {
        self.containers().iter().filter(|c| c.is_running()).count()
    }

    fn add_container(&self, id: &str, name: &str, state: ContainerState) {
        self.containers
            .lock()
            .unwrap()
            .push(ContainerInfo::new(id, name, state));
    }

    fn set_state(&self, id: &str, state: ContainerState) {
        for container in self.containers.lock().unwrap().iter_mut() {
            if container.id == id {
                container.state = state;
            }
        }
    }

    fn forget(&self, id: &str) {
        self.containers.lock().unwrap().retain(|c| c.id != id);
    }
}

#[async_trait]
impl ContainerDriver for MockDriver {
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, DriverError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(DriverError::ImageNotFound(spec.image_ref()));
        }
        let id = format!("ctr{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.add_container(&id, &spec.name, ContainerState::Running);
        self.specs.lock().unwrap().push(spec.clone());
        Ok(id)
    }

    async fn start(&self, container_id: &str) -> Result<(), DriverError> {
        if !self.containers().iter().any(|c| c.id == container_id) {
            return Err(DriverError::ContainerNotFound(container_id.to_string()));
        }
        self.set_state(container_id, ContainerState::Running);
        Ok(())
    }

    async fn stop(&self, container_id: &str, _grace: Duration) -> Result<(), DriverError> {
        self.set_state(container_id, ContainerState::Exited);
        self.stopped.lock().unwrap().push(container_id.to_string());
        Ok(())
    }

    async fn remove(&self, container_id: &str, _force: bool) -> Result<(), DriverError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(DriverError::Unavailable("daemon not responding".to_string()));
        }
        self.forget(container_id);
        self.removed.lock().unwrap().push(container_id.to_string());
        Ok(())
    }

    async fn list_managed(&self) -> Result<Vec<ContainerInfo>, DriverError> {
        let snapshot = self.containers();
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    fn driver_type(&self) -> &'static str {
        "mock"
    }
}

fn test_config() -> FleetManagerConfig {
    let mut config = FleetManagerConfig::default();
    config.fleet.public_address = "203.0.113.7".to_string();
    config.fleet.max_players_per_server = 4;
    config.fleet.max_party_size = 4;
    config.container.image = "registry.local/game".to_string();
    config.heartbeat.bind = "127.0.0.1:0".to_string();
    config.heartbeat.stale_after_secs = None;
    config.reaper.enabled = false;
    config.reconciler.run_on_startup = false;
    config
}

async fn start_with(
    config: FleetManagerConfig,
    driver: Arc<MockDriver>,
    store: Box<dyn InstanceStore>,
) -> FleetManager {
    FleetManager::start(FleetManagerArgs {
        config,
        driver,
        store,
        entitlement: EntitlementGate::disabled(),
        listen_heartbeats: false,
    })
    .await
    .unwrap()
}

async fn start(config: FleetManagerConfig) -> (FleetManager, Arc<MockDriver>) {
    let driver = Arc::new(MockDriver::default());
    let manager = start_with(config, driver.clone(), Box::new(MemoryStore::new())).await;
    (manager, driver)
}

fn party(size: u32) -> AllocationRequest {
    AllocationRequest {
        party_size: size,
        identity: None,
    }
}

fn record(id: i64, port: u16, state: ServerState) -> ServerInstance {
    let mut instance = NewInstance {
        server_id: format!("old-{id}"),
        public_address: "203.0.113.7".to_string(),
        private_address: "127.0.0.1".to_string(),
        port,
        max_capacity: 4,
        is_standby: false,
    }
    .into_instance(id, Utc::now());
    instance.container_id = Some(format!("gone{id}"));
    instance.state = state;
    instance
}

#[tokio::test]
async fn test_fresh_start_provisions_initial_fleet_and_allocates() {
    let mut config = test_config();
    config.reconciler.run_on_startup = true;
    let (manager, driver) = start(config).await;

    let servers = manager.list_servers().await.unwrap();
    assert_eq!(servers.len(), 2);
    assert!(servers.iter().all(|s| s.is_standby && s.state == ServerState::Standby));
    assert_eq!(driver.running(), 2);

    let allocation = manager.allocate(party(1)).await.unwrap();
    assert_eq!(allocation.placement, Placement::Existing);
    assert_eq!(allocation.instance.player_count, 1);
    assert_eq!(allocation.instance.state, ServerState::Running);
    assert_eq!(allocation.instance.public_address, "203.0.113.7");
}

#[tokio::test]
async fn test_containers_get_identity_environment() {
    let (manager, driver) = start(test_config()).await;
    let server = manager.create_server(ProvisionRequest::default()).await.unwrap();

    let specs = driver.specs.lock().unwrap().clone();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].host_port, server.port);
    assert_eq!(specs[0].env_value("Server-ID"), Some(server.server_id.as_str()));
    assert_eq!(specs[0].env_value("IP-Address"), Some("203.0.113.7"));
    assert!(specs[0].name.starts_with("GameServer-Instance--"));
}

#[tokio::test]
async fn test_heartbeat_updates_occupancy() {
    let (manager, _driver) = start(test_config()).await;
    let server = manager.create_server(ProvisionRequest::default()).await.unwrap();

    let outcome = manager
        .report_heartbeat(&HeartbeatReport::new(server.server_id.clone(), 3))
        .await
        .unwrap();
    assert_eq!(outcome, HeartbeatOutcome::Applied);

    let updated = manager.server_by_port(server.port).await.unwrap();
    assert_eq!(updated.player_count, 3);
    assert_eq!(updated.state, ServerState::Running);
    assert!(updated.last_heartbeat_at.is_some());

    let outcome = manager
        .report_heartbeat(&HeartbeatReport::new("not-a-server", 3))
        .await
        .unwrap();
    assert!(matches!(outcome, HeartbeatOutcome::UnknownServer(_)));
}

#[tokio::test]
async fn test_heartbeat_over_tcp() {
    let driver = Arc::new(MockDriver::default());
    let manager = FleetManager::start(FleetManagerArgs {
        config: test_config(),
        driver,
        store: Box::new(MemoryStore::new()),
        entitlement: EntitlementGate::disabled(),
        listen_heartbeats: true,
    })
    .await
    .unwrap();
    let server = manager.create_server(ProvisionRequest::default()).await.unwrap();
    let addr = manager.heartbeat_addr().unwrap();

    let payload = format!(r#"{{"ServerId":"{}","PlayerCount":2}}"#, server.server_id);
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut player_count = 0;
    for _ in 0..50 {
        player_count = manager.server_by_port(server.port).await.unwrap().player_count;
        if player_count == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(player_count, 2);

    manager.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_full_server_triggers_provisioning() {
    let (manager, driver) = start(test_config()).await;
    let first = manager.create_server(ProvisionRequest::default()).await.unwrap();
    manager.override_player_count(first.port, 4).await.unwrap();

    let allocation = manager.allocate(party(2)).await.unwrap();
    assert_eq!(allocation.placement, Placement::Provisioned);
    assert_ne!(allocation.instance.port, first.port);
    assert_eq!(allocation.instance.player_count, 2);
    assert_eq!(driver.running(), 2);
    assert_eq!(manager.list_servers().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_first_party_provisions_one_server() {
    let mut config = test_config();
    config.fleet.create_initial_servers = false;
    let (manager, driver) = start(config).await;
    assert!(manager.list_servers().await.unwrap().is_empty());

    let allocation = manager.allocate(party(4)).await.unwrap();
    assert_eq!(allocation.placement, Placement::Provisioned);
    assert_eq!(allocation.instance.player_count, 4);

    let servers = manager.list_servers().await.unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].player_count, 4);
    assert_eq!(driver.containers().len(), 1);

    let history = manager.history(&allocation.instance.server_id).await.unwrap();
    let sources: Vec<_> = history.history.iter().map(|r| r.source).collect();
    assert_eq!(sources, vec![OccupancySource::Allocation]);
}

#[tokio::test]
async fn test_party_joins_server_with_room() {
    let mut config = test_config();
    config.fleet.max_players_per_server = 50;
    config.fleet.max_party_size = 8;
    let (manager, driver) = start(config).await;

    let light = manager.create_server(ProvisionRequest::default()).await.unwrap();
    let full = manager.create_server(ProvisionRequest::default()).await.unwrap();
    manager.override_player_count(light.port, 10).await.unwrap();
    manager.override_player_count(full.port, 50).await.unwrap();

    let allocation = manager.allocate(party(5)).await.unwrap();
    assert_eq!(allocation.placement, Placement::Existing);
    assert_eq!(allocation.instance.port, light.port);
    assert_eq!(allocation.instance.player_count, 15);

    assert_eq!(manager.server_by_port(full.port).await.unwrap().player_count, 50);
    assert_eq!(driver.containers().len(), 2);
}

#[tokio::test]
async fn test_pool_skips_explicitly_placed_ports() {
    let (manager, driver) = start(test_config()).await;
    let pinned = manager
        .create_server(ProvisionRequest {
            standby: false,
            port: Some(5101),
        })
        .await
        .unwrap();
    assert_eq!(pinned.port, 5101);

    let first = manager.create_server(ProvisionRequest::default()).await.unwrap();
    let second = manager.create_server(ProvisionRequest::default()).await.unwrap();
    assert_eq!(first.port, 5100);
    assert_eq!(second.port, 5102);
    assert_eq!(driver.containers().len(), 3);
}

#[tokio::test]
async fn test_overfill_fallback_uses_least_loaded_server() {
    let mut config = test_config();
    config.fleet.overfill_fallback = true;
    let (manager, driver) = start(config).await;

    let busy = manager.create_server(ProvisionRequest::default()).await.unwrap();
    let light = manager.create_server(ProvisionRequest::default()).await.unwrap();
    manager.override_player_count(busy.port, 4).await.unwrap();
    manager.override_player_count(light.port, 3).await.unwrap();

    let allocation = manager.allocate(party(2)).await.unwrap();
    assert_eq!(allocation.placement, Placement::Overfilled);
    assert_eq!(allocation.instance.port, light.port);
    assert_eq!(allocation.instance.player_count, 5);
    assert_eq!(driver.containers().len(), 2);
}

#[tokio::test]
async fn test_concurrent_allocations_respect_capacity() {
    let (manager, _driver) = start(test_config()).await;
    manager.create_server(ProvisionRequest::default()).await.unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.allocate(party(1)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let servers = manager.list_servers().await.unwrap();
    let total: u32 = servers.iter().map(|s| s.player_count).sum();
    assert_eq!(total, 20);
    assert!(servers.iter().all(|s| s.player_count <= s.max_capacity));

    let mut endpoints: Vec<_> = servers.iter().map(|s| s.port).collect();
    endpoints.dedup();
    assert_eq!(endpoints.len(), servers.len());
}

#[tokio::test]
async fn test_policy_rejections() {
    let mut config = test_config();
    config.fleet.allow_server_joining = false;
    let (manager, _driver) = start(config).await;
    let err = manager.allocate(party(1)).await.unwrap_err();
    assert!(matches!(err, CoreError::JoiningDisabled));

    let mut config = test_config();
    config.fleet.allow_server_creation = false;
    let (manager, _driver) = start(config).await;
    let err = manager.allocate(party(1)).await.unwrap_err();
    assert!(matches!(err, CoreError::CreationDisabled));
    assert!(err.is_rejection());

    let (manager, _driver) = start(test_config()).await;
    let err = manager.allocate(party(5)).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidPartySize { size: 5, max: 4 }));
}

#[tokio::test]
async fn test_fleet_limit_is_enforced() {
    let mut config = test_config();
    config.fleet.max_servers = 1;
    config.fleet.create_initial_servers = false;
    let (manager, _driver) = start(config).await;

    let first = manager.create_server(ProvisionRequest::default()).await.unwrap();
    manager.override_player_count(first.port, 4).await.unwrap();

    let err = manager.allocate(party(1)).await.unwrap_err();
    assert!(matches!(err, CoreError::FleetFull { max: 1 }));
    assert_eq!(manager.list_servers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_container_start_leaves_no_record() {
    let (manager, driver) = start(test_config()).await;
    driver.fail_create.store(true, Ordering::SeqCst);

    let err = manager.create_server(ProvisionRequest::default()).await.unwrap_err();
    assert!(matches!(err, CoreError::Driver(DriverError::ImageNotFound(_))));
    assert!(manager.list_servers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_server_soft_deletes() {
    let (manager, driver) = start(test_config()).await;
    let server = manager.create_server(ProvisionRequest::default()).await.unwrap();
    manager
        .report_heartbeat(&HeartbeatReport::new(server.server_id.clone(), 1))
        .await
        .unwrap();

    let removed = manager.remove_server(server.port).await.unwrap();
    assert!(removed.teardown_error.is_none());
    assert_eq!(removed.instance.state, ServerState::Terminated);
    assert!(driver.containers().is_empty());

    assert!(manager.server_by_port(server.port).await.unwrap_err().is_not_found());
    assert!(manager.list_servers().await.unwrap().is_empty());

    // History stays queryable after deletion
    let history = manager.history(&server.server_id).await.unwrap();
    assert!(history.instance.deleted_at.is_some());
    assert_eq!(history.history.len(), 1);

    let err = manager.remove_server(server.port).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_reaper_removes_idle_servers_but_keeps_standby() {
    let (manager, driver) = start(test_config()).await;
    let standby = manager.create_server(ProvisionRequest::standby()).await.unwrap();
    let idle = manager.create_server(ProvisionRequest::default()).await.unwrap();
    let busy = manager.create_server(ProvisionRequest::default()).await.unwrap();
    manager.override_player_count(busy.port, 2).await.unwrap();

    let report = manager.sweep().await.unwrap();
    assert_eq!(report.reaped, vec![idle.server_id.clone()]);
    assert!(report.errors.is_empty());

    let ports: Vec<_> = manager
        .list_servers()
        .await
        .unwrap()
        .iter()
        .map(|s| s.port)
        .collect();
    assert_eq!(ports, vec![standby.port, busy.port]);
    assert_eq!(driver.containers().len(), 2);

    // Nothing left to reap
    let report = manager.sweep().await.unwrap();
    assert!(report.reaped.is_empty());
}

#[tokio::test]
async fn test_reaper_deletes_record_even_if_container_removal_fails() {
    let (manager, driver) = start(test_config()).await;
    let idle = manager.create_server(ProvisionRequest::default()).await.unwrap();
    driver.fail_remove.store(true, Ordering::SeqCst);

    let report = manager.sweep().await.unwrap();
    assert_eq!(report.reaped, vec![idle.server_id]);
    assert_eq!(report.errors.len(), 1);
    assert!(manager.list_servers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deletion_disabled_stops_instead_of_removing() {
    let mut config = test_config();
    config.fleet.allow_server_deletion = false;
    let (manager, driver) = start(config).await;
    let idle = manager.create_server(ProvisionRequest::default()).await.unwrap();

    manager.sweep().await.unwrap();
    assert!(driver.removed.lock().unwrap().is_empty());
    assert_eq!(driver.stopped.lock().unwrap().clone(), vec![idle.container_id.unwrap()]);
    assert!(manager.list_servers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reconciler_bootstraps_after_runtime_loss() {
    let store = MemoryStore::with_instances(vec![
        record(1, 5100, ServerState::Running),
        record(2, 5101, ServerState::Ready),
        record(3, 5102, ServerState::Standby),
    ]);
    let driver = Arc::new(MockDriver::default());
    let manager = start_with(test_config(), driver.clone(), Box::new(store)).await;
    assert_eq!(manager.list_servers().await.unwrap().len(), 3);

    let summary = manager.reconcile().await.unwrap();
    assert_eq!(summary.stale_records_removed, 3);
    assert_eq!(summary.replacements_provisioned, 0);
    assert_eq!(summary.bootstrapped, 2);

    let servers = manager.list_servers().await.unwrap();
    assert_eq!(servers.len(), 2);
    assert!(servers.iter().all(|s| s.is_standby));
    assert!(servers.iter().all(|s| s.port > 5102));
    assert_eq!(driver.running(), 2);
}

#[tokio::test]
async fn test_reconciler_removes_orphans_and_replaces_dead_servers() {
    let (manager, driver) = start(test_config()).await;
    let healthy = manager.create_server(ProvisionRequest::default()).await.unwrap();
    let dead = manager.create_server(ProvisionRequest::default()).await.unwrap();
    let dead_container = dead.container_id.clone().unwrap();
    driver.set_state(&dead_container, ContainerState::Exited);
    driver.add_container("stray01", "GameServer-Instance--9999-deadbeef", ContainerState::Running);

    let summary = manager.reconcile().await.unwrap();
    assert_eq!(summary.orphans_removed, 1);
    assert_eq!(summary.stale_records_removed, 1);
    assert_eq!(summary.replacements_provisioned, 1);
    assert_eq!(summary.bootstrapped, 0);
    assert!(summary.errors.is_empty());

    let servers = manager.list_servers().await.unwrap();
    assert_eq!(servers.len(), 2);
    assert!(servers.iter().any(|s| s.server_id == healthy.server_id));
    let replacement = servers
        .iter()
        .find(|s| s.server_id != healthy.server_id)
        .unwrap();
    assert_eq!(replacement.port, dead.port);
    assert_ne!(replacement.server_id, dead.server_id);

    // Every container is owned by a record and every record has a live container
    let containers = driver.containers();
    assert_eq!(containers.len(), 2);
    assert!(containers.iter().all(ContainerInfo::is_running));

    // A second pass finds nothing to do
    let summary = manager.reconcile().await.unwrap();
    assert_eq!(summary.orphans_removed + summary.stale_records_removed, 0);
}

#[tokio::test]
async fn test_reconcile_spares_server_provisioned_during_listing() {
    let mut config = test_config();
    config.fleet.create_initial_servers = false;
    let (manager, driver) = start(config).await;
    let busy = manager.create_server(ProvisionRequest::default()).await.unwrap();
    manager.override_player_count(busy.port, 4).await.unwrap();
    *driver.list_delay.lock().unwrap() = Some(Duration::from_millis(200));

    let pass = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.reconcile().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Lands while the pass is still waiting on the container listing
    let allocation = manager.allocate(party(4)).await.unwrap();
    assert_eq!(allocation.placement, Placement::Provisioned);
    let port = allocation.instance.port;

    let summary = pass.await.unwrap().unwrap();
    assert_eq!(summary.stale_records_removed, 0);
    assert_eq!(summary.replacements_provisioned, 0);
    assert_eq!(summary.orphans_removed, 0);

    let server = manager
        .server_by_id(&allocation.instance.server_id)
        .await
        .unwrap();
    assert_eq!(server.player_count, 4);
    let on_port = driver
        .specs
        .lock()
        .unwrap()
        .iter()
        .filter(|spec| spec.host_port == port)
        .count();
    assert_eq!(on_port, 1);
    assert_eq!(driver.containers().len(), 2);
}

#[tokio::test]
async fn test_reconcile_leaves_terminating_servers_alone() {
    let mut config = test_config();
    config.fleet.create_initial_servers = false;
    let tearing = record(1, 5100, ServerState::Terminating);
    let registry = RegistryHandle::spawn(
        Box::new(MemoryStore::with_instances(vec![tearing.clone()])),
        vec![tearing],
        16,
    );
    let driver = Arc::new(MockDriver::default());
    let provisioner = Arc::new(Provisioner::new(
        registry.clone(),
        driver.clone(),
        PortPool::new(5200, None),
        config.fleet.clone(),
        config.container.clone(),
    ));
    let reconciler = Reconciler::new(registry.clone(), provisioner, config.fleet.clone());

    let summary = reconciler.reconcile().await;
    assert_eq!(summary.stale_records_removed, 0);
    assert_eq!(summary.replacements_provisioned, 0);
    assert_eq!(summary.bootstrapped, 0);
    assert!(driver.containers().is_empty());

    let server = registry.by_server_id("old-1").await.unwrap();
    assert_eq!(server.state, ServerState::Terminating);
}

#[tokio::test]
async fn test_interrupted_teardown_finishes_on_start() {
    let store = MemoryStore::with_instances(vec![
        record(1, 5100, ServerState::Terminating),
        record(2, 5101, ServerState::Running),
    ]);
    let mut config = test_config();
    config.fleet.create_initial_servers = false;
    let driver = Arc::new(MockDriver::default());
    driver.add_container("gone1", "GameServer-Instance--5100-old1", ContainerState::Running);
    driver.add_container("gone2", "GameServer-Instance--5101-old2", ContainerState::Running);
    let manager = start_with(config, driver.clone(), Box::new(store)).await;

    let servers = manager.list_servers().await.unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].server_id, "old-2");
    assert_eq!(driver.removed.lock().unwrap().clone(), vec!["gone1".to_string()]);

    let history = manager.history("old-1").await.unwrap();
    assert!(history.instance.deleted_at.is_some());
}

#[tokio::test]
async fn test_sqlite_registry_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet.db");
    let driver = Arc::new(MockDriver::default());

    let first = {
        let store = SqliteStore::open(&path).unwrap();
        let manager = start_with(test_config(), driver.clone(), Box::new(store)).await;
        let server = manager.create_server(ProvisionRequest::default()).await.unwrap();
        manager.allocate(party(2)).await.unwrap();
        manager.shutdown(Duration::from_secs(5)).await.unwrap();
        server
    };

    let store = SqliteStore::open(&path).unwrap();
    let manager = start_with(test_config(), driver, Box::new(store)).await;
    let restored = manager.server_by_id(&first.server_id).await.unwrap();
    assert_eq!(restored.player_count, 2);

    // New servers continue after the restored ports
    let next = manager.create_server(ProvisionRequest::default()).await.unwrap();
    assert!(next.port > first.port);
}

#[tokio::test]
async fn test_events_are_streamed() {
    let (manager, _driver) = start(test_config()).await;
    let mut events = manager.subscribe();
    let server = manager.create_server(ProvisionRequest::default()).await.unwrap();

    let mut provisioned = false;
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        if let fleetmaster_api::FleetEvent::ServerProvisioned { server_id, .. } = event {
            assert_eq!(server_id, server.server_id);
            provisioned = true;
            break;
        }
    }
    assert!(provisioned);
}

#[tokio::test]
async fn test_shutdown_stops_accepting_work() {
    let mut config = test_config();
    config.reaper.enabled = true;
    config.reconciler.interval_secs = Some(60);
    config.fleet.stop_containers_on_shutdown = true;
    let (manager, driver) = start(config).await;
    manager.create_server(ProvisionRequest::default()).await.unwrap();

    manager.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(!manager.is_accepting());
    assert_eq!(driver.running(), 0);

    let err = manager.allocate(party(1)).await.unwrap_err();
    assert!(matches!(err, CoreError::ShuttingDown));

    // Second call is a no-op
    manager.shutdown(Duration::from_secs(1)).await.unwrap();
}
