//! fleetmaster-driver: Container runtime abstraction
//!
//! Provides the `ContainerDriver` capability consumed by the fleet core and
//! a Docker implementation that drives the `docker` CLI.

pub mod docker;
pub mod error;
pub mod traits;
pub mod types;

pub use docker::{DockerDriver, DockerDriverConfig};
pub use error::DriverError;
pub use traits::ContainerDriver;
pub use types::{ContainerInfo, ContainerSpec, ContainerState, PortProtocol};
