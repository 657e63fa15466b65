//! Application state shared by all handlers.

use std::sync::Arc;

use portrait_core::Config;
use portrait_db::AssetRepository;
use portrait_services::EntityResolver;
use portrait_storage::AssetStore;
use portrait_worker::DerivativeQueue;

use crate::services::{AcquisitionService, MaintenanceService};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub repository: Arc<dyn AssetRepository>,
    pub store: AssetStore,
    pub resolver: Arc<dyn EntityResolver>,
    pub queue: DerivativeQueue,
    pub acquisition: AcquisitionService,
    pub maintenance: MaintenanceService,
}

impl AppState {
    /// Admin token, if the administrative endpoints are enabled.
    pub fn admin_token(&self) -> Option<&str> {
        self.config.server.admin_token.as_deref()
    }
}
