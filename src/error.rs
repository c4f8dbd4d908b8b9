use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error types with appropriate HTTP status codes.
///
/// Authentication and allowlist denials deliberately do NOT appear here:
/// the gates terminate those requests themselves (dropped connection or a
/// bare 404) so that a denial is indistinguishable from a missing route.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid upload request: {0}")]
    InvalidUpload(String),

    #[error("Storage operation failed: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body, matching the envelope of successful upload responses
/// (`success`, `error`) so every route answers in one shape.
#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full error details server-side for debugging
        // but only expose sanitized messages to clients
        tracing::error!(error = %self, "Request failed");

        let (status, message) = match &self {
            // Client errors - the message is user-facing by construction
            AppError::InvalidUpload(msg) => (StatusCode::BAD_REQUEST, msg.clone()),

            // Upstream storage errors - never expose backend details to clients
            AppError::StorageError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Storage backend request failed. Please try again later.".to_string(),
            ),

            // Internal errors - never expose internal details to clients
            AppError::ConfigError(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred. Please contact support if the issue persists."
                    .to_string(),
            ),
        };

        let body = ErrorBody {
            success: false,
            error: message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidUpload(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::InvalidUpload(rejection.body_text())
    }
}

/// JSON extractor whose rejections answer in the gateway's error envelope
/// instead of axum's plain-text default.
#[derive(axum::extract::FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
