//! Application setup and initialization

pub mod database;
pub mod routes;
pub mod server;
pub mod services;

use std::sync::Arc;

use anyhow::{Context, Result};
use portrait_core::Config;
use portrait_services::{EntityResolver, WikidataClient};
use portrait_storage::AssetStore;

use crate::state::AppState;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    let state = initialize_state(&config).await?;
    let router = routes::setup_routes(&config, state.clone());

    Ok((state, router))
}

/// Telemetry, repository, storage and services, without the HTTP layer.
pub async fn initialize_state(config: &Config) -> Result<Arc<AppState>> {
    crate::telemetry::init_telemetry(&config.server.log_format);

    tracing::info!(
        environment = %config.server.environment,
        storage_root = %config.storage.root.display(),
        "Configuration loaded and validated successfully"
    );

    let repository = database::setup_repository(config).await?;

    let store = AssetStore::new(&config.storage.root)
        .await
        .context("Failed to initialize asset storage")?;

    let resolver: Arc<dyn EntityResolver> = Arc::new(
        WikidataClient::new(&config.entities).context("Failed to create Wikidata client")?,
    );

    services::initialize_services(config, repository, store, resolver)
}
