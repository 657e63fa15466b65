//! HTTP handlers.

pub mod admin;
pub mod entities;
pub mod health;
pub mod multi_url_upload;
pub mod single_upload;

use axum::http::{header, HeaderMap};
use portrait_core::UploadContext;

pub const SINGLE_UPLOAD_PATH: &str = "/image/single_upload";
pub const MULTI_UPLOAD_PATH: &str = "/image/multi_upload";
pub const ADMIN_IMAGES_PATH: &str = "/admin/images";

/// Host the request was made through, without port.
pub(crate) fn request_host(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");

    // Bracketed IPv6 literals keep their colons.
    if let Some(rest) = host.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_string();
        }
    }
    host.split(':').next().unwrap_or(host).to_lowercase()
}

pub(crate) fn upload_context(headers: &HeaderMap) -> UploadContext {
    UploadContext::new(request_host(headers))
}

/// `Referer` when the client sent one, `fallback` otherwise.
pub(crate) fn referer_or(headers: &HeaderMap, fallback: &str) -> String {
    headers
        .get(header::REFERER)
        .and_then(|h| h.to_str().ok())
        .filter(|r| !r.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
