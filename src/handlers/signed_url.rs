//! Pre-signed upload URL handler.
//!
//! # Endpoint
//!
//! - `POST /signedurl` (and `/signedurl-dev`) - JSON body
//!   `{ "filename": ..., "contentType": ... }`
//!
//! On success the storage collaborator returns a time-limited PUT URL the
//! client uploads to directly, bypassing this gateway for the file bytes.
//! Each successful issuance increments a dedicated counter labeled by host
//! and client IP.

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::http::header::HOST;
use tracing::{info, instrument};

use crate::error::{AppError, AppJson, AppResult};
use crate::metrics::record_signed_url_created;
use crate::middleware::client_ip::ClientIdentity;
use crate::models::{SignedUrlRequest, UploadResponse};
use crate::state::{AppState, StorageTarget};
use crate::validation::validate_image_filename;

/// Handle a signed-URL issuance request.
///
/// # Response Body
///
/// ```json
/// {
///   "success": true,
///   "url": "https://storage.googleapis.com/bucket/photo.png?X-Goog-Signature=...",
///   "message": "Signed URL generated successfully"
/// }
/// ```
#[instrument(skip_all, fields(target = ?target))]
pub async fn create_signed_url(
    State(state): State<AppState>,
    Extension(target): Extension<StorageTarget>,
    headers: HeaderMap,
    ClientIdentity(client_ip): ClientIdentity,
    AppJson(payload): AppJson<SignedUrlRequest>,
) -> AppResult<Json<UploadResponse>> {
    if payload.filename.is_empty() || payload.content_type.is_empty() {
        return Err(AppError::InvalidUpload(
            "Filename and ContentType are required".to_string(),
        ));
    }

    validate_image_filename(&payload.filename)?;

    let storage = state.storage_for(target)?;
    let url = storage
        .signed_put_url(&payload.filename, &payload.content_type)
        .await?;

    // Issuance counter, labeled like the request counter's host/IP pair
    let hostname = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    record_signed_url_created(hostname, &client_ip);

    info!(filename = %payload.filename, "Signed URL issued");

    Ok(Json(UploadResponse::success(
        url,
        "Signed URL generated successfully",
    )))
}
