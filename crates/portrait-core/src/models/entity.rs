//! Linked-data entity references.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::Asset;

/// A Wikidata item id such as `Q42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Build an id from its numeric part (`42` -> `Q42`).
    pub fn from_numeric(id: u64) -> Self {
        EntityId(format!("Q{}", id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric part of the id, as stored on asset records.
    pub fn numeric(&self) -> u64 {
        // Digits were checked on construction.
        self.0[1..].parse().unwrap_or_default()
    }

    /// Sitelink to the entity's Wikidata page.
    pub fn sitelink(&self) -> String {
        format!("https://www.wikidata.org/wiki/{}", self.0)
    }

    /// Parse a comma separated list (`Q1,Q2, Q3`), skipping blanks.
    pub fn parse_list(input: &str) -> Result<Vec<EntityId>, PipelineError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for EntityId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('Q')
            .ok_or_else(|| PipelineError::InvalidEntity(trimmed.to_string()))?;
        let valid = !digits.is_empty()
            && !digits.starts_with('0')
            && digits.len() <= 19
            && digits.bytes().all(|b| b.is_ascii_digit());
        if !valid {
            return Err(PipelineError::InvalidEntity(trimmed.to_string()));
        }
        Ok(EntityId(trimmed.to_string()))
    }
}

impl TryFrom<String> for EntityId {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the entity-resolution collaborator knows about one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub id: EntityId,
    /// Language code -> label.
    pub labels: HashMap<String, String>,
    /// Commons file names from the entity's image claims, in claim order.
    pub image_claims: Vec<String>,
}

impl EntityInfo {
    pub fn label(&self, language: &str) -> Option<&str> {
        self.labels.get(language).map(String::as_str)
    }

    pub fn first_image(&self) -> Option<&str> {
        self.image_claims.first().map(String::as_str)
    }
}

/// One row of the multi-upload overview.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
    pub id: EntityId,
    pub link: String,
    pub label: Option<String>,
    pub images: Vec<String>,
    pub existing: Option<Asset>,
}
