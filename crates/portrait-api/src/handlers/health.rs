//! Health check handler.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use portrait_core::{AssetFilter, AssetSort};

use crate::state::AppState;

const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Run an async check with timeout; returns status string "healthy", "timeout", or "{prefix}: {error}".
async fn run_check<F, E>(timeout: Duration, f: F, error_prefix: &str) -> String
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, f).await {
        Ok(Ok(())) => "healthy".to_string(),
        Ok(Err(e)) => format!("{}: {}", error_prefix, e),
        Err(_) => "timeout".to_string(),
    }
}

#[derive(serde::Serialize)]
pub(crate) struct HealthCheckResponse {
    pub status: String,
    pub database: String,
    pub storage: String,
}

/// `GET /health`
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = run_check(
        CHECK_TIMEOUT,
        async {
            state
                .repository
                .find(&AssetFilter::default(), AssetSort::default(), Some(1))
                .await
                .map(|_| ())
        },
        "error",
    )
    .await;

    let storage = run_check(
        CHECK_TIMEOUT,
        async {
            tokio::fs::metadata(state.store.root())
                .await
                .map(|_| ())
        },
        "error",
    )
    .await;

    let healthy = database == "healthy" && storage == "healthy";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthCheckResponse {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            database,
            storage,
        }),
    )
}
