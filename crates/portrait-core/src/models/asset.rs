//! Asset record and the values used to create and query it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an asset is in the two-phase naming lifecycle.
///
/// A record is created `Provisional` while its original still lives under the random
/// provisional name, and becomes `Finalized` once the original has been renamed to
/// `originals/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetState {
    Provisional,
    Finalized,
}

impl AssetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetState::Provisional => "provisional",
            AssetState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provisional" => Ok(AssetState::Provisional),
            "finalized" => Ok(AssetState::Finalized),
            other => Err(format!("Unknown asset state: {}", other)),
        }
    }
}

/// Persisted asset record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub state: AssetState,
    pub name: Option<String>,
    pub source_url: Option<String>,
    pub source_name: Option<String>,
    pub original_filename: Option<String>,
    pub internal_file_name: Option<String>,
    pub mimetype: String,
    pub upload_site: String,
    pub wikidata_entity: Option<u64>,
    pub wikidata_label: Option<String>,
    pub recorded_date: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Creation payload; the repository assigns `id`, `state` and `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewAsset {
    pub name: Option<String>,
    pub source_url: Option<String>,
    pub source_name: Option<String>,
    pub original_filename: Option<String>,
    pub internal_file_name: Option<String>,
    pub mimetype: String,
    pub upload_site: String,
    pub wikidata_entity: Option<u64>,
    pub wikidata_label: Option<String>,
    pub recorded_date: Option<NaiveDate>,
    pub created_by: Option<String>,
}

/// Filter for `find`. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetFilter {
    pub upload_site: Option<String>,
    pub wikidata_entity: Option<u64>,
    pub state: Option<AssetState>,
}

impl AssetFilter {
    /// Only records whose original has been finalized; what listings should show.
    pub fn finalized() -> Self {
        Self {
            state: Some(AssetState::Finalized),
            ..Self::default()
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.upload_site = Some(site.into());
        self
    }

    pub fn with_entity(mut self, entity: u64) -> Self {
        self.wikidata_entity = Some(entity);
        self
    }

    pub fn matches(&self, asset: &Asset) -> bool {
        self.upload_site
            .as_ref()
            .is_none_or(|site| &asset.upload_site == site)
            && self
                .wikidata_entity
                .is_none_or(|entity| asset.wikidata_entity == Some(entity))
            && self.state.is_none_or(|state| asset.state == state)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssetSort {
    #[default]
    CreatedAsc,
    CreatedDesc,
    NameAsc,
}

/// Per-request values threaded through every workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadContext {
    /// Host the upload was made through; scopes records per deployment.
    pub upload_site: String,
    pub created_by: Option<String>,
}

impl UploadContext {
    pub fn new(upload_site: impl Into<String>) -> Self {
        Self {
            upload_site: upload_site.into(),
            created_by: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.created_by = Some(user.into());
        self
    }
}
