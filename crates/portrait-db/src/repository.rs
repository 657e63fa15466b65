use async_trait::async_trait;
use portrait_core::{Asset, AssetFilter, AssetSort, NewAsset};
use uuid::Uuid;

use crate::error::RepositoryResult;

/// Storage of asset records.
///
/// Ids are assigned inside `create` and nowhere else. New records start out
/// `provisional`; `mark_finalized` flips them once their original is in place.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn create(&self, asset: NewAsset) -> RepositoryResult<Asset>;

    async fn find(
        &self,
        filter: &AssetFilter,
        sort: AssetSort,
        limit: Option<u32>,
    ) -> RepositoryResult<Vec<Asset>>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Asset>>;

    /// Fails with `NotFound` if the record does not exist.
    async fn mark_finalized(&self, id: Uuid) -> RepositoryResult<Asset>;

    /// Returns whether a record was deleted.
    async fn delete_one(&self, id: Uuid) -> RepositoryResult<bool>;
}
