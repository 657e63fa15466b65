//! Entity resolution: labels, image claims and relatives of linked-data entities.

mod wikidata;

pub use wikidata::WikidataClient;

use std::collections::HashMap;

use async_trait::async_trait;
use portrait_core::{EntityId, EntityInfo, PipelineError};

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Unexpected response from {endpoint}: {reason}")]
    Response { endpoint: String, reason: String },

    #[error("Service error {code}: {info}")]
    Service { code: String, info: String },
}

pub type ResolverResult<T> = Result<T, ResolverError>;

impl From<ResolverError> for PipelineError {
    fn from(err: ResolverError) -> Self {
        PipelineError::Resolution(err.to_string())
    }
}

#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// Labels (in `language`) and image claims for each id. Ids the service does not know
    /// are absent from the map.
    async fn resolve_entities(
        &self,
        ids: &[EntityId],
        language: &str,
    ) -> ResolverResult<HashMap<EntityId, EntityInfo>>;

    /// `id` followed by its family relations, at most `limit` ids, without duplicates.
    async fn resolve_related_entities(
        &self,
        id: &EntityId,
        limit: usize,
    ) -> ResolverResult<Vec<EntityId>>;
}
