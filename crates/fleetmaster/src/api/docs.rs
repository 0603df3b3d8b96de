//! OpenAPI document

use utoipa::OpenApi;

use fleetmaster_api::events::FleetEvent;
use fleetmaster_api::requests::{AllocateRequest, CreateServerRequest, PlayerCountRequest};
use fleetmaster_api::responses::{
    AllocateResponse, FleetActionResponse, HealthResponse, OccupancyEntry, ReconcileSummary,
    ServerHistoryResponse, ServerSummary,
};

use crate::api::{ApiError, allocate, fleet, servers, system, ws};

#[derive(OpenApi)]
#[openapi(
    info(title = "fleetmaster", description = "Game-server fleet manager"),
    paths(
        system::health,
        servers::list_servers,
        servers::create_server,
        servers::get_server,
        servers::get_server_by_id,
        servers::server_history,
        servers::remove_server,
        servers::override_player_count,
        servers::report_player_count,
        allocate::connect,
        allocate::allocate,
        fleet::reconcile,
        fleet::start_all,
        fleet::stop_all,
        ws::events,
    ),
    components(schemas(
        ApiError,
        AllocateRequest,
        AllocateResponse,
        CreateServerRequest,
        PlayerCountRequest,
        HealthResponse,
        ServerSummary,
        ServerHistoryResponse,
        OccupancyEntry,
        ReconcileSummary,
        FleetActionResponse,
        FleetEvent,
    ))
)]
pub struct ApiDoc;
