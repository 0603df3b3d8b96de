//! fleetmaster-client: HTTP and WebSocket client library
//!
//! Provides both HTTP and WebSocket clients for communicating with the
//! fleetmaster daemon.
//!
//! # Examples
//!
//! ## HTTP Client
//!
//! ```no_run
//! use fleetmaster_client::HttpClient;
//! use fleetmaster_api::responses::AllocateResponse;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new("http://localhost:8080")?;
//!
//! let health = client.health().await?;
//! println!("Status: {} ({} servers)", health.status, health.live_servers);
//!
//! // Full servers only
//! let servers = client.list_servers().full().send().await?;
//!
//! // Seat a party of three
//! if let AllocateResponse::Assigned { ip_address, port, .. } = client.allocate(3, None).await? {
//!     println!("join {ip_address}:{port}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## WebSocket Client
//!
//! ```no_run
//! use fleetmaster_client::WsClient;
//! use fleetmaster_api::events::FleetEvent;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = WsClient::connect("ws://localhost:8080/ws/events").await?;
//!
//! while let Some(event) = client.recv().await {
//!     if let FleetEvent::ServerStateChanged { server_id, from, to } = event {
//!         println!("{server_id}: {from} -> {to}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod ws;

pub use error::{ClientError, Result};
pub use http::{HttpClient, ListServersBuilder};
pub use ws::WsClient;
