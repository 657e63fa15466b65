//! Batch upload: one remote URL per entity.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, response::Response};
use portrait_core::ErrorMetadata;
use serde::Deserialize;

use crate::error::{see_other, FormError, StatusMessage, ValidatedJson};
use crate::handlers::{referer_or, upload_context};
use crate::services::{BatchEntry, BatchReport};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MultiUrlUploadRequest {
    #[serde(default)]
    pub entries: Vec<BatchEntry>,
}

fn batch_status(report: &BatchReport) -> StatusMessage {
    let uploaded = format!("{} files uploaded.", report.success_count());
    match &report.failure {
        None => StatusMessage::success(uploaded),
        Some(failure) => {
            let mut msg = format!(
                "{} {} (entity {})",
                uploaded,
                failure.error.client_message(),
                failure.entity
            );
            if report.rollback_failure.is_some() {
                msg.push_str(" The failed entry could not be cleaned up.");
            }
            StatusMessage::errors(msg)
        }
    }
}

/// `POST /image/multi_url_upload`
#[tracing::instrument(skip(state, headers, request), fields(operation = "multi_url_upload", entries = request.entries.len()))]
pub async fn multi_url_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<MultiUrlUploadRequest>,
) -> Result<Response, FormError> {
    let location = referer_or(&headers, "/");
    if request.entries.iter().all(|e| e.url.trim().is_empty()) {
        return Ok(see_other(&location, StatusMessage::errors("Nothing.")));
    }

    let ctx = upload_context(&headers);
    let report = state
        .acquisition
        .upload_batch(&ctx, request.entries)
        .await
        .map_err(|e| FormError::new(e, location.clone()))?;

    Ok(see_other(&location, batch_status(&report)))
}
