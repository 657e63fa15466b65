//! Bearer-token guard for the administrative routes.
//!
//! Without `ADMIN_TOKEN` configured the guarded routes answer 404.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::error::HttpAppError;
use crate::state::AppState;

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub async fn admin_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_token() else {
        return HttpAppError::Disabled("Administration").into_response();
    };

    let auth_header = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        Some(h) => h,
        None => {
            tracing::warn!(path = %request.uri().path(), "Admin request without authorization header");
            return HttpAppError::Unauthorized("Missing authorization header".to_string())
                .into_response();
        }
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return HttpAppError::Unauthorized("Expected a bearer token".to_string()).into_response();
    };

    if !secure_compare(token.trim(), expected) {
        tracing::warn!(path = %request.uri().path(), "Admin request with invalid token");
        return HttpAppError::Unauthorized("Invalid admin token".to_string()).into_response();
    }

    next.run(request).await
}
