//! Upload input validation: file extensions, content types, and filenames.

use std::path::Path;

use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// File extensions accepted by the upload and signed-URL endpoints.
///
/// Matching is case-insensitive and suffix-based, so `photo.JPG` and
/// `archive.tar.png` both pass.
pub const VALID_IMAGE_EXTENSIONS: [&str; 7] =
    [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".svg"];

/// Maximum length for uploaded file names.
///
/// Object stores accept much longer keys; this bound exists to keep object
/// names and metric labels sane.
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Check whether a filename carries one of the accepted image extensions.
pub fn is_valid_image_type(filename: &str) -> bool {
    let lowered = filename.to_lowercase();
    VALID_IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lowered.ends_with(ext))
}

/// Validate a filename for upload.
///
/// Rules:
/// - Must not be empty
/// - Must not exceed [`MAX_FILENAME_LENGTH`] characters
/// - Must end with one of [`VALID_IMAGE_EXTENSIONS`] (case-insensitive)
pub fn validate_image_filename(filename: &str) -> AppResult<()> {
    if filename.is_empty() {
        return Err(AppError::InvalidUpload(
            "Filename cannot be empty".to_string(),
        ));
    }

    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(AppError::InvalidUpload(format!(
            "Filename cannot exceed {MAX_FILENAME_LENGTH} characters"
        )));
    }

    if !is_valid_image_type(filename) {
        return Err(AppError::InvalidUpload(
            "Invalid file type. Allowed: jpg, jpeg, png, gif, webp, bmp, svg".to_string(),
        ));
    }

    Ok(())
}

/// Strip any path components from a filename, keeping only the final segment.
///
/// Uploaded filenames are client-controlled; a name like `../../etc/passwd.png`
/// must not be able to place objects outside the intended prefix.
pub fn sanitize_filename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Map a filename to its content type based on the extension.
///
/// Unknown extensions fall back to `application/octet-stream`.
pub fn content_type_for(filename: &str) -> &'static str {
    let lowered = filename.to_lowercase();
    let ext = lowered.rsplit('.').next().unwrap_or_default();

    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
