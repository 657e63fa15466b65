//! In-memory asset repository.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use portrait_core::{Asset, AssetFilter, AssetSort, AssetState, NewAsset};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::AssetRepository;

/// Repository operation, used to make the in-memory repository fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    Create,
    Find,
    Get,
    MarkFinalized,
    Delete,
}

/// Records kept in insertion order behind a mutex.
#[derive(Clone, Default)]
pub struct InMemoryAssetRepository {
    assets: Arc<Mutex<Vec<Asset>>>,
    failing: Arc<Mutex<HashSet<RepositoryOperation>>>,
}

impl InMemoryAssetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `operation` fail with `Unavailable`.
    pub async fn fail(&self, operation: RepositoryOperation) {
        self.failing.lock().await.insert(operation);
    }

    pub async fn recover(&self, operation: RepositoryOperation) {
        self.failing.lock().await.remove(&operation);
    }

    /// Every record regardless of state.
    pub async fn all(&self) -> Vec<Asset> {
        self.assets.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.assets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.assets.lock().await.is_empty()
    }

    async fn check(&self, operation: RepositoryOperation) -> RepositoryResult<()> {
        if self.failing.lock().await.contains(&operation) {
            return Err(RepositoryError::Unavailable(format!(
                "{:?} disabled",
                operation
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetRepository for InMemoryAssetRepository {
    async fn create(&self, asset: NewAsset) -> RepositoryResult<Asset> {
        self.check(RepositoryOperation::Create).await?;

        let record = Asset {
            id: Uuid::new_v4(),
            state: AssetState::Provisional,
            name: asset.name,
            source_url: asset.source_url,
            source_name: asset.source_name,
            original_filename: asset.original_filename,
            internal_file_name: asset.internal_file_name,
            mimetype: asset.mimetype,
            upload_site: asset.upload_site,
            wikidata_entity: asset.wikidata_entity,
            wikidata_label: asset.wikidata_label,
            recorded_date: asset.recorded_date,
            created_by: asset.created_by,
            view_count: 0,
            created_at: Utc::now(),
        };
        self.assets.lock().await.push(record.clone());
        Ok(record)
    }

    async fn find(
        &self,
        filter: &AssetFilter,
        sort: AssetSort,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<Asset>> {
        self.check(RepositoryOperation::Find).await?;

        let mut matches: Vec<Asset> = self
            .assets
            .lock()
            .await
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();

        // Stable sorts keep insertion order among equal keys.
        match sort {
            AssetSort::CreatedAsc => matches.sort_by_key(|a| a.created_at),
            AssetSort::CreatedDesc => {
                matches.reverse();
                matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            }
            AssetSort::NameAsc => matches.sort_by(|a, b| a.name.cmp(&b.name)),
        }

        if let Some(limit) = limit {
            matches.truncate(limit as usize);
        }
        Ok(matches)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Asset>> {
        self.check(RepositoryOperation::Get).await?;
        Ok(self.assets.lock().await.iter().find(|a| a.id == id).cloned())
    }

    async fn mark_finalized(&self, id: Uuid) -> RepositoryResult<Asset> {
        self.check(RepositoryOperation::MarkFinalized).await?;
        let mut assets = self.assets.lock().await;
        let asset = assets
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        asset.state = AssetState::Finalized;
        Ok(asset.clone())
    }

    async fn delete_one(&self, id: Uuid) -> RepositoryResult<bool> {
        self.check(RepositoryOperation::Delete).await?;
        let mut assets = self.assets.lock().await;
        let before = assets.len();
        assets.retain(|a| a.id != id);
        Ok(assets.len() < before)
    }
}
