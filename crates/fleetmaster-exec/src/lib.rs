//! fleetmaster-exec: Command execution abstraction
//!
//! Provides the trait and local implementation used to drive container
//! runtime tooling (the `docker` CLI) from the fleet manager.

pub mod error;
pub mod local;
pub mod result;
pub mod traits;

pub use error::ExecError;
pub use local::LocalExecutor;
pub use result::{CommandResult, quote};
pub use traits::CommandExecutor;
