//! HTTP error response conversion
//!
//! Two shapes of failure leave the API:
//! - [`HttpAppError`] answers with a status code and an [`ErrorResponse`] body. Used by
//!   read endpoints and for requests that could not be parsed at all.
//! - [`FormError`] answers the way form submissions are answered on success: `303 See
//!   Other` back to the form with an `errors` [`StatusMessage`].

use axum::{
    extract::rejection::JsonRejection,
    extract::{FromRequest, Request},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use portrait_core::{ErrorMetadata, LogLevel, PipelineError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether this error is recoverable (can be retried)
    pub recoverable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Success,
    Errors,
}

/// Outcome message carried by a form redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub msg: String,
}

impl StatusMessage {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            msg: msg.into(),
        }
    }

    pub fn errors(msg: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Errors,
            msg: msg.into(),
        }
    }
}

/// `303 See Other` to `location` with the status message as JSON body.
pub fn see_other(location: &str, status: StatusMessage) -> Response {
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, location.to_string())],
        Json(status),
    )
        .into_response()
}

#[derive(Debug)]
pub enum HttpAppError {
    Pipeline(PipelineError),
    InvalidInput(String),
    Unauthorized(String),
    /// The endpoint exists but is switched off by configuration.
    Disabled(&'static str),
}

impl From<PipelineError> for HttpAppError {
    fn from(err: PipelineError) -> Self {
        HttpAppError::Pipeline(err)
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError::Pipeline(PipelineError::Internal(err.to_string()))
    }
}

/// Convert JSON body deserialization failures into a 400 with our ErrorResponse format.
impl From<JsonRejection> for HttpAppError {
    fn from(rejection: JsonRejection) -> Self {
        HttpAppError::InvalidInput(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl HttpAppError {
    fn status(&self) -> StatusCode {
        match self {
            HttpAppError::Pipeline(e) => StatusCode::from_u16(e.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            HttpAppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            HttpAppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HttpAppError::Disabled(_) => StatusCode::NOT_FOUND,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            HttpAppError::Pipeline(e) => e.error_code(),
            HttpAppError::InvalidInput(_) => "INVALID_INPUT",
            HttpAppError::Unauthorized(_) => "UNAUTHORIZED",
            HttpAppError::Disabled(_) => "DISABLED",
        }
    }

    fn client_message(&self) -> String {
        match self {
            HttpAppError::Pipeline(e) => e.client_message(),
            HttpAppError::InvalidInput(msg) | HttpAppError::Unauthorized(msg) => msg.clone(),
            HttpAppError::Disabled(what) => format!("{} is disabled", what),
        }
    }
}

/// JSON body extractor that returns our ErrorResponse format (400 + JSON) on deserialization failure.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = HttpAppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(inner) = Json::<T>::from_request(req, state)
            .await
            .map_err(HttpAppError::from)?;
        Ok(ValidatedJson(inner))
    }
}

pub(crate) fn log_error(error: &PipelineError) {
    let code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_code = code, "Request failed");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_code = code, "Request failed");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, error_code = code, "Request failed");
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
        .unwrap_or(false)
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let details = match &self {
            HttpAppError::Pipeline(e) => {
                log_error(e);
                (!is_production_env()).then(|| e.to_string())
            }
            other => {
                tracing::debug!(error = ?other, "Request rejected");
                None
            }
        };

        let recoverable = matches!(&self, HttpAppError::Pipeline(e) if e.is_recoverable());
        let body = Json(ErrorResponse {
            error: self.client_message(),
            details,
            code: self.code().to_string(),
            recoverable,
        });

        (self.status(), body).into_response()
    }
}

/// A failed form submission: redirect back with a human-readable message.
#[derive(Debug)]
pub struct FormError {
    error: Option<PipelineError>,
    message: String,
    location: String,
}

impl FormError {
    pub fn new(error: impl Into<PipelineError>, location: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            message: error.client_message(),
            error: Some(error),
            location: location.into(),
        }
    }

    /// A rejection that did not come out of the pipeline (missing or malformed fields).
    pub fn message(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            error: None,
            message: message.into(),
            location: location.into(),
        }
    }
}

impl IntoResponse for FormError {
    fn into_response(self) -> Response {
        match &self.error {
            Some(error) => log_error(error),
            None => tracing::debug!(msg = %self.message, "Form rejected"),
        }
        see_other(&self.location, StatusMessage::errors(self.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_serializes_kind_lowercase() {
        let json = serde_json::to_value(StatusMessage::errors("URL invalid.")).unwrap();
        assert_eq!(json["kind"], "errors");
        assert_eq!(json["msg"], "URL invalid.");
    }

    #[test]
    fn test_form_error_redirects_with_client_message() {
        let response =
            FormError::new(PipelineError::Fetch("timeout".into()), "/image/single_upload")
                .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/image/single_upload"
        );
    }

    #[test]
    fn test_http_error_status_codes() {
        assert_eq!(
            HttpAppError::from(PipelineError::InvalidEntity("X".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HttpAppError::Unauthorized("no".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(HttpAppError::Disabled("admin").status(), StatusCode::NOT_FOUND);
    }
}
