use std::sync::Arc;

use acquirer_core::{AcquisitionCoordinator, Config, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    coordinator: Arc<AcquisitionCoordinator>,
}

impl AppState {
    pub fn new(config: Config, coordinator: Arc<AcquisitionCoordinator>) -> Self {
        Self {
            config,
            coordinator,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn coordinator(&self) -> &Arc<AcquisitionCoordinator> {
        &self.coordinator
    }
}
