//! Object storage collaborator: uploads and pre-signed upload URLs.
//!
//! The gating pipeline treats storage as an opaque capability behind the
//! [`StorageAccessor`] trait; handlers never see provider types. The
//! production implementation is [`GcsStore`], backed by `object_store`'s GCS
//! support. Tests substitute their own accessor.

mod gcs;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::error::AppResult;
use crate::validation::sanitize_filename;

pub use gcs::GcsStore;

/// Opaque storage capability used by the protected handlers.
#[async_trait]
pub trait StorageAccessor: Send + Sync {
    /// Store uploaded file contents under a unique object name.
    ///
    /// Returns the public URL of the stored object.
    async fn store_object(&self, original_filename: &str, data: Bytes) -> AppResult<String>;

    /// Generate a pre-signed PUT URL for a direct upload of `object`.
    ///
    /// `content_type` is what the uploader will send; implementations may use
    /// it to constrain the upload where the provider supports that.
    async fn signed_put_url(&self, object: &str, content_type: &str) -> AppResult<String>;
}

/// Build a unique object name for an uploaded file.
///
/// Format: `{unix-timestamp}-{sanitized-stem}{extension}`. The timestamp
/// prefix keeps repeated uploads of the same filename from overwriting each
/// other; sanitization strips client-supplied path components.
pub fn unique_object_name(original_filename: &str) -> String {
    let sanitized = sanitize_filename(original_filename);

    let (stem, ext) = match sanitized.rfind('.') {
        Some(dot) => sanitized.split_at(dot),
        None => (sanitized.as_str(), ""),
    };

    format!("{}-{stem}{ext}", Utc::now().timestamp())
}
