//! Repository selection.

use std::sync::Arc;

use anyhow::{Context, Result};
use portrait_core::Config;
use portrait_db::{AssetRepository, InMemoryAssetRepository, SqliteAssetRepository};

/// `DATABASE_URL=memory` keeps records in process memory; anything else is a SQLite URL.
pub async fn setup_repository(config: &Config) -> Result<Arc<dyn AssetRepository>> {
    let url = config.storage.database_url.trim();
    if url.eq_ignore_ascii_case("memory") {
        tracing::warn!("Using in-memory asset repository; records are lost on restart");
        return Ok(Arc::new(InMemoryAssetRepository::new()));
    }

    let repository = SqliteAssetRepository::connect(url)
        .await
        .context("Failed to open asset database")?;
    Ok(Arc::new(repository))
}
