//! Route configuration and setup

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
    Router,
};
use portrait_core::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::admin_middleware;
use crate::handlers;
use crate::state::AppState;

/// Multipart framing and the text fields around an upload.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router<()> {
    let image_routes = Router::new()
        .route(
            "/image/single_upload",
            post(handlers::single_upload::single_upload),
        )
        .route(
            "/image/multi_url_upload",
            post(handlers::multi_url_upload::multi_url_upload),
        )
        .route(
            "/image/entities/import",
            post(handlers::entities::import_entities),
        )
        .route("/image/multi_upload", get(handlers::entities::multi_upload))
        .route(
            "/image/person_select",
            post(handlers::entities::person_select),
        );

    let admin_routes = Router::new()
        .route(
            "/admin/images/reload_thumbnails",
            post(handlers::admin::reload_thumbnails),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ));

    let body_limit = usize::try_from(config.fetch.max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(image_routes)
        .merge(admin_routes)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(setup_cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn setup_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}
