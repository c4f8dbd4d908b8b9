//! Cross-origin policy enforcement and preflight handling.
//!
//! Applied to every route, public and protected. Three behaviors:
//!
//! 1. When the request's `Origin` is allowed by policy (wildcard entry or
//!    exact match), the origin value is reflected back as
//!    `Access-Control-Allow-Origin`. A disallowed origin is a *soft* denial:
//!    the header is omitted and the request still proceeds - the browser
//!    enforces the restriction, not the server. This is deliberately
//!    asymmetric with the hard auth/IP denials.
//! 2. The fixed `Allow-Methods`/`Allow-Headers`/`Max-Age` headers are set on
//!    every response.
//! 3. Any `OPTIONS` request is answered here with 204 and an empty body;
//!    preflights never reach the auth gates or the handlers.
//!
//! `tower_http::cors` is not used because it answers only true preflights
//! (OPTIONS with `Access-Control-Request-Method`) and attaches the fixed
//! headers only to those; this service's contract covers every OPTIONS and
//! every response.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{HeaderValue, ORIGIN};
use axum::http::{HeaderMap, Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::debug;

/// Methods advertised to browsers.
const ALLOW_METHODS: HeaderValue = HeaderValue::from_static("POST, GET, OPTIONS");

/// Headers clients may send cross-origin; `X-API-Key` is required for the
/// browser to attach credentials to protected routes.
const ALLOW_HEADERS: HeaderValue = HeaderValue::from_static("Content-Type, X-API-Key");

/// How long browsers may cache a preflight answer (one hour).
const MAX_AGE: HeaderValue = HeaderValue::from_static("3600");

/// Allowed-origin policy compiled from configuration.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    origins: Vec<String>,
    allow_any: bool,
}

impl OriginPolicy {
    /// Compile the policy from configured origin strings.
    ///
    /// An empty list or a `*` entry allows every origin.
    pub fn new(configured: &[String]) -> Self {
        let allow_any = configured.is_empty() || configured.iter().any(|origin| origin == "*");

        Self {
            origins: configured.to_vec(),
            allow_any,
        }
    }

    /// Check whether an origin is allowed by policy.
    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allow_any || self.origins.iter().any(|allowed| allowed == origin)
    }
}

/// CORS enforcement layer applied to the whole router.
#[derive(Clone)]
pub struct CorsEnforcementLayer {
    policy: Arc<OriginPolicy>,
}

impl CorsEnforcementLayer {
    /// Create a layer from configured origin strings.
    pub fn new(allowed_origins: &[String]) -> Self {
        Self {
            policy: Arc::new(OriginPolicy::new(allowed_origins)),
        }
    }
}

impl<S> Layer<S> for CorsEnforcementLayer {
    type Service = CorsEnforcementService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorsEnforcementService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// CORS enforcement service wrapper.
#[derive(Clone)]
pub struct CorsEnforcementService<S> {
    inner: S,
    policy: Arc<OriginPolicy>,
}

impl<S> Service<Request<Body>> for CorsEnforcementService<S>
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
        let policy = self.policy.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // Reflect the origin only when present and allowed; a mismatch is
            // soft - the request continues without the header
            let reflected_origin = req
                .headers()
                .get(ORIGIN)
                .filter(|origin| {
                    origin
                        .to_str()
                        .is_ok_and(|value| policy.is_allowed(value))
                })
                .cloned();

            // Preflight: answer here, nothing downstream runs
            if req.method() == Method::OPTIONS {
                debug!(path = %req.uri().path(), "answering preflight request");
                let mut response = StatusCode::NO_CONTENT.into_response();
                apply_cors_headers(response.headers_mut(), reflected_origin);
                return Ok(response);
            }

            let mut response = inner.call(req).await?;
            apply_cors_headers(response.headers_mut(), reflected_origin);
            Ok(response)
        })
    }
}

/// Attach the fixed CORS headers, plus the reflected origin when allowed.
fn apply_cors_headers(headers: &mut HeaderMap, reflected_origin: Option<HeaderValue>) {
    if let Some(origin) = reflected_origin {
        headers.insert("access-control-allow-origin", origin);
    }

    headers.insert("access-control-allow-methods", ALLOW_METHODS);
    headers.insert("access-control-allow-headers", ALLOW_HEADERS);
    headers.insert("access-control-max-age", MAX_AGE);
}
