//! Service wiring.

use std::sync::Arc;

use anyhow::{Context, Result};
use portrait_core::Config;
use portrait_db::AssetRepository;
use portrait_processing::{DerivativeGenerator, RemoteFetcher};
use portrait_services::EntityResolver;
use portrait_storage::AssetStore;
use portrait_worker::{DerivativeQueue, DerivativeQueueConfig};

use crate::services::{AcquisitionService, MaintenanceService};
use crate::state::AppState;

/// Build the application state around the given collaborators. Spawns the derivative
/// worker pool, so it must run inside a tokio runtime.
pub fn initialize_services(
    config: &Config,
    repository: Arc<dyn AssetRepository>,
    store: AssetStore,
    resolver: Arc<dyn EntityResolver>,
) -> Result<Arc<AppState>> {
    let fetcher = RemoteFetcher::new(&config.fetch).context("Failed to create HTTP client")?;

    let queue_config = DerivativeQueueConfig::from(&config.derivatives);
    tracing::info!(
        max_workers = queue_config.max_workers,
        capacity = queue_config.capacity,
        "Starting derivative queue"
    );
    let queue = DerivativeQueue::new(
        DerivativeGenerator::new(&config.derivatives),
        store.derivative_roots().clone(),
        queue_config,
    );

    let acquisition = AcquisitionService::new(
        repository.clone(),
        store.clone(),
        fetcher,
        resolver.clone(),
        queue.clone(),
        config.entities.clone(),
    );
    let maintenance = MaintenanceService::new(repository.clone(), store.clone(), queue.clone());

    Ok(Arc::new(AppState {
        config: config.clone(),
        repository,
        store,
        resolver,
        queue,
        acquisition,
        maintenance,
    }))
}
