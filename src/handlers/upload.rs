//! Multipart image upload handler.
//!
//! # Endpoint
//!
//! - `POST /upload` (and `/upload-dev`) - multipart form with an `image` field
//!
//! The handler runs only after the CORS, API key, and IP allowlist layers
//! have all passed; by the time it executes, the request is authorized.
//!
//! # Validation
//!
//! - The `image` field must be present and carry a filename
//! - The filename must have an accepted image extension
//! - The file must not exceed the configured `MAX_FILE_SIZE_MB`
//!
//! Validation failures answer with a descriptive 400 in the upload envelope;
//! storage failures answer with a generic 500.

use axum::Json;
use axum::extract::multipart::Multipart;
use axum::extract::{Extension, FromRequest, Request, State};
use bytes::Bytes;
use tracing::{info, instrument};

use crate::error::{AppError, AppResult};
use crate::models::UploadResponse;
use crate::state::{AppState, StorageTarget};
use crate::validation::validate_image_filename;

/// Multipart form field that carries the file.
const IMAGE_FIELD: &str = "image";

/// Multipart extractor whose rejection (e.g. a missing or wrong
/// `Content-Type`) answers in the gateway's error envelope instead of
/// axum's plain-text default.
pub struct AppMultipart(pub Multipart);

impl<S> FromRequest<S> for AppMultipart
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Multipart::from_request(req, state)
            .await
            .map(AppMultipart)
            .map_err(AppError::from)
    }
}

/// Handle an image upload.
///
/// # Response Body
///
/// ```json
/// {
///   "success": true,
///   "url": "https://storage.googleapis.com/bucket/1700000000-photo.png",
///   "message": "Image uploaded successfully"
/// }
/// ```
#[instrument(skip_all, fields(target = ?target))]
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(target): Extension<StorageTarget>,
    AppMultipart(multipart): AppMultipart,
) -> AppResult<Json<UploadResponse>> {
    let (filename, data) = read_image_field(multipart).await?;

    validate_image_filename(&filename)?;

    let max = state.config.max_file_size;
    if data.len() as u64 > max {
        return Err(AppError::InvalidUpload(format!(
            "File too large. Max size: {} MB",
            max / (1024 * 1024)
        )));
    }

    let storage = state.storage_for(target)?;
    let url = storage.store_object(&filename, data).await?;

    info!(filename = %filename, url = %url, "Image uploaded");

    Ok(Json(UploadResponse::success(
        url,
        "Image uploaded successfully",
    )))
}

/// Read the `image` field out of the multipart stream.
///
/// Fields ahead of it are skipped; a stream that ends without the field is a
/// client error. Returns the client-supplied filename and the file contents.
async fn read_image_field(mut multipart: Multipart) -> AppResult<(String, Bytes)> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::InvalidUpload(format!("Failed to parse form: {}", e.body_text()))
    })? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_owned)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                AppError::InvalidUpload("No filename provided for the image field".to_string())
            })?;

        let data = field.bytes().await.map_err(|e| {
            AppError::InvalidUpload(format!("Failed to read upload: {}", e.body_text()))
        })?;

        return Ok((filename, data));
    }

    Err(AppError::InvalidUpload(
        "No image file provided. Use 'image' as the form field name.".to_string(),
    ))
}
