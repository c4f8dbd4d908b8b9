//! API key authentication gate for the protected upload routes.
//!
//! Compares the `X-API-Key` header against the configured shared secret with
//! plain string equality. There is deliberately no rate limiting, lockout, or
//! timing-attack mitigation here; the only policy is equality.
//!
//! # Stealth Denial
//!
//! A missing or wrong key does not produce a 401. The gate closes the
//! connection without writing any response (or answers with a bare 404 when
//! connection-level control is unavailable), so an attacker probing for the
//! upload endpoint cannot tell it apart from a route that does not exist.
//! See [`super::denial`] for the mechanism.
//!
//! # Composition
//!
//! The layer holds a non-optional secret: the router composer decides once at
//! startup whether authentication is enabled and simply does not install this
//! layer when no key is configured.
//!
//! # Usage
//!
//! ```bash
//! API_KEY=your-secret-key cargo run
//! curl -H "X-API-Key: your-secret-key" -F "image=@photo.png" http://localhost:8080/upload
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::warn;

use super::denial::stealth_deny;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// API key authentication layer for the protected routes.
#[derive(Clone)]
pub struct ApiKeyGate {
    /// The configured shared secret
    secret: Arc<str>,
}

impl ApiKeyGate {
    /// Create a new API key gate with the given shared secret.
    ///
    /// The composer must not install this layer when authentication is
    /// disabled; an empty secret here would deny every request.
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl<S> Layer<S> for ApiKeyGate {
    type Service = ApiKeyGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyGateService {
            inner,
            secret: self.secret.clone(),
        }
    }
}

/// API key authentication service wrapper.
#[derive(Clone)]
pub struct ApiKeyGateService<S> {
    inner: S,
    secret: Arc<str>,
}

impl<S> Service<Request<Body>> for ApiKeyGateService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let secret = self.secret.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if !key_matches(&req, &secret) {
                warn!(path = %req.uri().path(), "missing or invalid API key");
                return Ok(stealth_deny(&req, "invalid api key").await);
            }

            inner.call(req).await
        })
    }
}

/// Check the provided key against the configured secret.
///
/// A missing, unreadable, or empty header never matches.
fn key_matches<B>(req: &Request<B>, secret: &str) -> bool {
    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    !provided.is_empty() && provided == secret
}
