//! HTTP router configuration

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api::{allocate, docs::ApiDoc, fleet, servers, system, ws};
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // System endpoints
        .route("/health", get(system::health))
        // Servers
        .route(
            "/servers",
            get(servers::list_servers).post(servers::create_server),
        )
        .route(
            "/servers/{port}",
            get(servers::get_server).delete(servers::remove_server),
        )
        // PUT takes a port, POST a server id
        .route(
            "/servers/{port}/player-count",
            post(servers::report_player_count).put(servers::override_player_count),
        )
        .route("/servers/by-id/{server_id}", get(servers::get_server_by_id))
        .route(
            "/servers/by-id/{server_id}/history",
            get(servers::server_history),
        )
        // Allocation
        .route("/connect", get(allocate::connect))
        .route("/allocate", post(allocate::allocate))
        // Fleet operations
        .route("/fleet/reconcile", post(fleet::reconcile))
        .route("/fleet/start-all", post(fleet::start_all))
        .route("/fleet/stop-all", post(fleet::stop_all))
        // WebSocket
        .route("/ws/events", get(ws::events))
        // State
        .with_state(state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use fleetmaster_api::requests::{AllocateRequest, CreateServerRequest, PlayerCountRequest};
    use fleetmaster_api::responses::{
        AllocateResponse, FleetActionResponse, HealthResponse, ServerHistoryResponse,
        ServerSummary,
    };
    use fleetmaster_core::{EntitlementGate, FleetManager, FleetManagerArgs, MemoryStore};
    use fleetmaster_driver::{
        ContainerDriver, ContainerInfo, ContainerSpec, ContainerState, DriverError,
    };
    use reqwest::StatusCode;

    use super::*;
    use crate::config::Config;

    #[derive(Default)]
    struct MockDriver {
        containers: Mutex<Vec<ContainerInfo>>,
        next_id: AtomicUsize,
    }

    #[async_trait]
    impl ContainerDriver for MockDriver {
        async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, DriverError> {
            let id = format!("ctr{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            self.containers.lock().unwrap().push(ContainerInfo::new(
                &id,
                &spec.name,
                ContainerState::Running,
            ));
            Ok(id)
        }

        async fn start(&self, _container_id: &str) -> Result<(), DriverError> {
            Ok(())
        }

        async fn stop(&self, container_id: &str, _grace: Duration) -> Result<(), DriverError> {
            for c in self.containers.lock().unwrap().iter_mut() {
                if c.id == container_id {
                    c.state = ContainerState::Exited;
                }
            }
            Ok(())
        }

        async fn remove(&self, container_id: &str, _force: bool) -> Result<(), DriverError> {
            self.containers
                .lock()
                .unwrap()
                .retain(|c| c.id != container_id);
            Ok(())
        }

        async fn list_managed(&self) -> Result<Vec<ContainerInfo>, DriverError> {
            Ok(self.containers.lock().unwrap().clone())
        }

        fn driver_type(&self) -> &'static str {
            "mock"
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.fleet.public_address = "203.0.113.7".to_string();
        config.fleet.max_players_per_server = 4;
        config.fleet.max_party_size = 4;
        config.fleet.initial_servers = 1;
        config.container.image = "registry.local/game".to_string();
        config.heartbeat.stale_after_secs = None;
        config.reaper.enabled = false;
        config.reconciler.run_on_startup = false;
        config
    }

    async fn serve(config: Config) -> (String, FleetManager) {
        let manager = FleetManager::start(FleetManagerArgs {
            config: config.manager_config(),
            driver: Arc::new(MockDriver::default()),
            store: Box::new(MemoryStore::new()),
            entitlement: EntitlementGate::disabled(),
            listen_heartbeats: false,
        })
        .await
        .unwrap();

        let state = Arc::new(AppState::new(manager.clone(), config));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        (format!("http://{addr}"), manager)
    }

    #[tokio::test]
    async fn test_health() {
        let (base, _manager) = serve(test_config()).await;
        let health: HealthResponse = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.live_servers, 0);
    }

    #[tokio::test]
    async fn test_server_lifecycle() {
        let (base, _manager) = serve(test_config()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/servers"))
            .json(&CreateServerRequest {
                standby: true,
                port: None,
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: ServerSummary = response.json().await.unwrap();
        assert!(created.standby);
        assert_eq!(created.port, 5100);

        let fetched: ServerSummary = client
            .get(format!("{base}/servers/by-id/{}", created.server_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(fetched.port, 5100);

        // heartbeat over HTTP, then an operator overwrite
        let response = client
            .post(format!("{base}/servers/{}/player-count", created.server_id))
            .json(&PlayerCountRequest { player_count: 3 })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let overwritten: ServerSummary = client
            .put(format!("{base}/servers/5100/player-count"))
            .json(&PlayerCountRequest { player_count: 4 })
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(overwritten.player_count, 4);

        let full: Vec<ServerSummary> = client
            .get(format!("{base}/servers?full=true"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(full.len(), 1);

        let response = client
            .delete(format!("{base}/servers/5100"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = client
            .get(format!("{base}/servers/5100"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let history: ServerHistoryResponse = client
            .get(format!("{base}/servers/by-id/{}/history", created.server_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(history.server.deleted_at.is_some());
        assert_eq!(history.history.len(), 2);
    }

    #[tokio::test]
    async fn test_heartbeat_for_unknown_server() {
        let (base, _manager) = serve(test_config()).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/servers/nope/player-count"))
            .json(&PlayerCountRequest { player_count: 1 })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_allocate_and_connect() {
        let (base, _manager) = serve(test_config()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/allocate"))
            .json(&AllocateRequest {
                party_size: 3,
                identity: None,
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let AllocateResponse::Assigned {
            ip_address,
            port,
            player_count,
            ..
        } = response.json().await.unwrap()
        else {
            panic!("expected an assignment");
        };
        assert_eq!(ip_address, "203.0.113.7");
        assert_eq!(port, 5100);
        assert_eq!(player_count, 3);

        // no room for two more on the first server
        let assigned: AllocateResponse = client
            .get(format!("{base}/connect?partySize=2"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(matches!(assigned, AllocateResponse::Assigned { port: 5101, .. }));

        let response = client
            .get(format!("{base}/connect?partySize=9"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_allocate_with_joining_disabled() {
        let mut config = test_config();
        config.fleet.allow_server_joining = false;
        let (base, _manager) = serve(config).await;

        let response = reqwest::get(format!("{base}/connect?partySize=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: AllocateResponse = response.json().await.unwrap();
        assert!(matches!(body, AllocateResponse::JoiningDisabled { .. }));
    }

    #[tokio::test]
    async fn test_fleet_operations() {
        let (base, manager) = serve(test_config()).await;
        let client = reqwest::Client::new();

        let summary: fleetmaster_api::responses::ReconcileSummary = client
            .post(format!("{base}/fleet/reconcile"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(summary.bootstrapped, 1);
        assert_eq!(manager.list_servers().await.unwrap().len(), 1);

        let stopped: FleetActionResponse = client
            .post(format!("{base}/fleet/stop-all"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stopped.affected, 1);
        assert!(stopped.errors.is_empty());
    }

    #[tokio::test]
    async fn test_docs_served() {
        let (base, _manager) = serve(test_config()).await;
        let response = reqwest::get(format!("{base}/docs")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
