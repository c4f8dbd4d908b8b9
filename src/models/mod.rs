mod api;

pub use api::{HealthResponse, SignedUrlRequest, UploadResponse};
