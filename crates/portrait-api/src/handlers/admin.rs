//! Administrative endpoints. Routed behind [`crate::auth::admin_middleware`].

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, response::Response};

use crate::error::{see_other, FormError, StatusMessage};
use crate::handlers::{request_host, ADMIN_IMAGES_PATH};
use crate::services::ReloadReport;
use crate::state::AppState;

fn reload_status(report: &ReloadReport) -> StatusMessage {
    let msg = format!(
        "All thumbnails were reloaded: {} images, {} thumbnails, {} face crops, {} failures.",
        report.processed,
        report.thumbnails,
        report.face_crops,
        report.failures.len()
    );
    if report.failures.is_empty() {
        StatusMessage::success(msg)
    } else {
        StatusMessage::errors(msg)
    }
}

/// `POST /admin/images/reload_thumbnails`: regenerate derivatives for this site.
#[tracing::instrument(skip(state, headers), fields(operation = "reload_thumbnails"))]
pub async fn reload_thumbnails(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, FormError> {
    let site = request_host(&headers);
    let report = state
        .maintenance
        .reload_thumbnails(&site)
        .await
        .map_err(|e| FormError::new(e, ADMIN_IMAGES_PATH))?;

    Ok(see_other(ADMIN_IMAGES_PATH, reload_status(&report)))
}
