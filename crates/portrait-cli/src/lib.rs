//! Helpers shared by the `portrait` command-line tool.

use anyhow::Context;
use portrait_api::services::Acquired;
use portrait_core::{EntityId, ErrorMetadata, PipelineError};
use portrait_worker::DerivativeTicket;
use serde::Serialize;
use uuid::Uuid;

/// What the CLI prints for each stored asset.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AcquiredSummary {
    pub id: Uuid,
    pub entity: Option<String>,
    pub label: Option<String>,
    pub source_url: Option<String>,
    pub mimetype: String,
}

impl From<&Acquired> for AcquiredSummary {
    fn from(acquired: &Acquired) -> Self {
        let asset = &acquired.asset;
        Self {
            id: asset.id,
            entity: asset
                .wikidata_entity
                .map(|n| EntityId::from_numeric(n).to_string()),
            label: asset.wikidata_label.clone(),
            source_url: asset.source_url.clone(),
            mimetype: asset.mimetype.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailureSummary {
    pub entity: String,
    pub code: &'static str,
    pub message: String,
}

impl FailureSummary {
    pub fn new(entity: &EntityId, error: &PipelineError) -> Self {
        Self {
            entity: entity.to_string(),
            code: error.error_code(),
            message: error.to_string(),
        }
    }
}

/// Entity ids from positional arguments; each argument may itself be a comma list.
pub fn parse_ids(args: &[String]) -> Result<Vec<EntityId>, PipelineError> {
    let mut ids = Vec::new();
    for arg in args {
        for id in EntityId::parse_list(arg)? {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

/// Block until every derivative job has finished. Failures are logged, not returned:
/// the originals are already stored.
pub async fn wait_for_derivatives(tickets: impl IntoIterator<Item = DerivativeTicket>) {
    for ticket in tickets {
        let asset_id = ticket.asset_id();
        match ticket.wait().await {
            Ok(report) => {
                for error in report.errors() {
                    tracing::warn!(asset_id = %asset_id, error = %error, "Derivative failed");
                }
            }
            Err(e) => tracing::warn!(asset_id = %asset_id, error = %e, "Derivative job lost"),
        }
    }
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}
