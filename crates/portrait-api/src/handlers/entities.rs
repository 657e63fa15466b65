//! Entity-driven endpoints: Commons import, the multi-upload overview and the
//! person picker that leads to it.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use portrait_core::{EntityId, EntitySummary, ErrorMetadata, PipelineError};
use serde::Deserialize;

use crate::error::{see_other, FormError, HttpAppError, StatusMessage, ValidatedJson};
use crate::handlers::{referer_or, upload_context, MULTI_UPLOAD_PATH};
use crate::services::ImportReport;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Comma separated entity ids.
    pub ids: String,
}

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    pub ids: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PersonSelectRequest {
    #[serde(rename = "wikidataEntityId")]
    pub wikidata_entity_id: String,
}

fn import_status(report: &ImportReport) -> StatusMessage {
    let mut msg = format!(
        "{} files imported, {} entities without image, {} failed.",
        report.imported.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for id in &report.skipped {
        msg.push(' ');
        msg.push_str(&PipelineError::NoImage(id.to_string()).client_message());
    }
    for (id, error) in &report.failed {
        msg.push_str(&format!(" {} (entity {})", error.client_message(), id));
    }
    if report.failed.is_empty() {
        StatusMessage::success(msg)
    } else {
        StatusMessage::errors(msg)
    }
}

/// `POST /image/entities/import`
#[tracing::instrument(skip(state, headers, request), fields(operation = "import_entities"))]
pub async fn import_entities(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<ImportRequest>,
) -> Result<Response, FormError> {
    let location = referer_or(&headers, MULTI_UPLOAD_PATH);
    let ids = EntityId::parse_list(&request.ids).map_err(|e| FormError::new(e, location.clone()))?;
    if ids.is_empty() {
        return Err(FormError::message("Nothing.", location));
    }

    let ctx = upload_context(&headers);
    let report = state.acquisition.import_entities(&ctx, &ids).await;
    Ok(see_other(&location, import_status(&report)))
}

/// `GET /image/multi_upload?ids=Q1,Q2`
pub async fn multi_upload(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OverviewQuery>,
) -> Result<Json<Vec<EntitySummary>>, HttpAppError> {
    let ids = match query.ids.as_deref() {
        Some(ids) => EntityId::parse_list(ids)?,
        None => Vec::new(),
    };
    let summaries = state.acquisition.entity_overview(&ids).await?;
    Ok(Json(summaries))
}

/// `POST /image/person_select`: forward to the overview of the person and their
/// relatives.
pub async fn person_select(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<PersonSelectRequest>,
) -> Result<Response, FormError> {
    let location = referer_or(&headers, "/");
    let id: EntityId = request
        .wikidata_entity_id
        .parse()
        .map_err(|e| FormError::new(e, location.clone()))?;

    let related = state
        .acquisition
        .related_entities(&id)
        .await
        .map_err(|e| FormError::new(e, location))?;

    let ids: Vec<&str> = related.iter().map(EntityId::as_str).collect();
    let target = format!("{}?ids={}", MULTI_UPLOAD_PATH, ids.join(","));
    Ok(Redirect::to(&target).into_response())
}
