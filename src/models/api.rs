use serde::{Deserialize, Serialize};

/// Response for the upload and signed-URL endpoints.
///
/// Success and failure share this envelope; the optional fields are omitted
/// from the serialized body when unset.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Whether the operation succeeded
    pub success: bool,
    /// Public object URL (upload) or pre-signed PUT URL (signed URL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Human-readable success message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Human-readable error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResponse {
    /// Build a success response carrying a URL.
    pub fn success(url: String, message: &str) -> Self {
        Self {
            success: true,
            url: Some(url),
            message: Some(message.to_string()),
            error: None,
        }
    }

    /// Build a failure response carrying an error message.
    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            url: None,
            message: None,
            error: Some(error),
        }
    }
}

/// Response for the health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status ("healthy")
    pub status: String,
    /// Human-readable status message
    pub message: String,
}

/// Request body for the signed-URL endpoints.
///
/// ```json
/// { "filename": "photo.png", "contentType": "image/png" }
/// ```
#[derive(Debug, Deserialize, Serialize)]
pub struct SignedUrlRequest {
    /// Object name to sign the upload URL for
    pub filename: String,
    /// Content type the uploader will send
    #[serde(rename = "contentType")]
    pub content_type: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_response_success_omits_error() {
        let response = UploadResponse::success(
            "https://storage.googleapis.com/bucket/object.png".to_string(),
            "Image uploaded successfully",
        );

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"url\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_upload_response_failure_omits_url() {
        let response = UploadResponse::failure("Invalid file type".to_string());

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"error\""));
        assert!(!json.contains("\"url\""));
        assert!(!json.contains("\"message\""));
    }

    #[test]
    fn test_signed_url_request_uses_camel_case_content_type() {
        let request: SignedUrlRequest =
            serde_json::from_str(r#"{"filename":"a.png","contentType":"image/png"}"#).unwrap();

        assert_eq!(request.filename, "a.png");
        assert_eq!(request.content_type, "image/png");
    }

    #[test]
    fn test_signed_url_request_rejects_snake_case_content_type() {
        let result: Result<SignedUrlRequest, _> =
            serde_json::from_str(r#"{"filename":"a.png","content_type":"image/png"}"#);

        assert!(result.is_err());
    }
}
