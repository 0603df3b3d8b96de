//! Application state shared across HTTP handlers

use std::sync::Arc;

use fleetmaster_core::FleetManager;

use crate::config::Config;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Fleet manager façade
    pub manager: FleetManager,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state
    pub fn new(manager: FleetManager, config: Config) -> Self {
        Self {
            manager,
            config: Arc::new(config),
        }
    }
}
