//! Google Cloud Storage implementation of the storage accessor.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use tracing::{debug, info};

use super::{StorageAccessor, unique_object_name};
use crate::error::{AppError, AppResult};
use crate::validation::content_type_for;

/// Validity window for pre-signed upload URLs (15 minutes is usually enough).
const SIGNED_URL_EXPIRY: Duration = Duration::from_secs(15 * 60);

/// GCS-backed storage accessor for one bucket.
#[derive(Debug)]
pub struct GcsStore {
    store: GoogleCloudStorage,
    bucket: String,
}

impl GcsStore {
    /// Create a storage accessor from a bucket name and service account key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` when the client cannot be constructed,
    /// e.g. an unreadable or malformed service account key file.
    pub fn connect(bucket: &str, service_account_path: &str) -> AppResult<Self> {
        let store = GoogleCloudStorageBuilder::new()
            .with_bucket_name(bucket)
            .with_service_account_path(service_account_path)
            .build()
            .map_err(|e| {
                AppError::ConfigError(format!("Failed to create GCS client for {bucket}: {e}"))
            })?;

        Ok(Self {
            store,
            bucket: bucket.to_string(),
        })
    }

    /// Verify the bucket is reachable with the configured credentials.
    ///
    /// Called once at startup so misconfiguration surfaces before the server
    /// starts accepting uploads.
    pub async fn verify_access(&self) -> AppResult<()> {
        self.store
            .list_with_delimiter(None)
            .await
            .map_err(|e| AppError::StorageError(format!("Bucket {} unreachable: {e}", self.bucket)))?;

        info!(bucket = %self.bucket, "Storage bucket reachable");
        Ok(())
    }

    /// Name of the bucket this accessor writes to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl StorageAccessor for GcsStore {
    async fn store_object(&self, original_filename: &str, data: Bytes) -> AppResult<String> {
        let object = unique_object_name(original_filename);
        let content_type = content_type_for(&object);

        let path = ObjectPath::parse(&object)
            .map_err(|_| AppError::InvalidUpload("Invalid file name".to_string()))?;

        let mut opts = PutOptions::default();
        opts.attributes =
            Attributes::from_iter([(Attribute::ContentType, AttributeValue::from(content_type))]);

        self.store
            .put_opts(&path, PutPayload::from(data), opts)
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to upload object: {e}")))?;

        debug!(bucket = %self.bucket, object = %object, "Object uploaded");

        Ok(format!(
            "https://storage.googleapis.com/{}/{}",
            self.bucket, object
        ))
    }

    async fn signed_put_url(&self, object: &str, content_type: &str) -> AppResult<String> {
        let path = ObjectPath::parse(object)
            .map_err(|_| AppError::InvalidUpload("Invalid file name".to_string()))?;

        // The V4 signature covers method, object, and expiry; the uploader
        // supplies the content type on the PUT itself.
        debug!(
            bucket = %self.bucket,
            object = %object,
            content_type = %content_type,
            "Signing upload URL"
        );

        let url = self
            .store
            .signed_url(Method::PUT, &path, SIGNED_URL_EXPIRY)
            .await
            .map_err(|e| AppError::StorageError(format!("Failed to sign URL: {e}")))?;

        Ok(url.to_string())
    }
}
