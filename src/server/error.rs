use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::error::MetricsError;

// ─── Unified error type ──────────────────────────────────────────

/// Handler error. The variant records which family of route failed,
/// because an unknown metric type is `501` on the plain-text routes and
/// `400` on the JSON ones.
#[derive(Debug)]
pub enum AppError {
    Path(MetricsError),
    Json(MetricsError),
    BadRequest(String),
    Forbidden(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Path(MetricsError::InvalidType(_)) => StatusCode::NOT_IMPLEMENTED,
            Self::Path(e) | Self::Json(e) => status_of(e),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

fn status_of(err: &MetricsError) -> StatusCode {
    match err {
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        MetricsError::NotFound { .. } => StatusCode::NOT_FOUND,
        MetricsError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Path(e) | Self::Json(e) => e.to_string(),
            Self::BadRequest(msg) | Self::Forbidden(msg) => msg,
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), %message, "request failed");
        }

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
