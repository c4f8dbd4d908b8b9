//! Application routing: route classes and the middleware stack.
//!
//! # Route Classes
//!
//! - **Public**: `/health` and `/metrics`, reachable with no auth or IP checks
//! - **Protected**: `/upload`, `/signedurl` (primary bucket) and
//!   `/upload-dev`, `/signedurl-dev` (dev bucket, when configured)
//!
//! # Middleware Stack (request order)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Metrics      │ ← every request except /metrics itself
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Trace / Req ID  │ ← logging and X-Request-Id
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Timeout      │ ← bounds the whole request, storage call included
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← OPTIONS answered here, origin reflected
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     API Key      │ ← protected routes, when a key is configured
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   IP Allowlist   │ ← protected routes, when a list is configured
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! Denials in the API key and allowlist gates short-circuit with a dropped
//! connection (or bare 404); an unmatched CORS origin does not deny.

use axum::Router;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers;
use crate::middleware::{
    ApiKeyGate, CorsEnforcementLayer, IpAllowlistGate, MetricsLayer, RequestIdLayer,
};
use crate::state::{AppState, StorageTarget};

/// Extra room on top of the file size limit for multipart framing and the
/// other form fields.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Build the application router with all routes and middleware configured.
///
/// Gate installation is decided once, here, from the access policy:
///
/// - **API key gate**: installed on the protected routes only when a key is
///   configured. No key means the protected routes are exposed without
///   authentication - a legitimate setup for trusted networks, logged loudly.
/// - **IP allowlist gate**: installed only when authentication is enabled and
///   the allowlist is non-empty.
///
/// # Arguments
///
/// * `state` - Application state containing config and storage accessors
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    // =========================================================================
    // Public Routes
    // =========================================================================
    let public = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_exposition));

    // =========================================================================
    // Protected Routes (per storage target)
    // =========================================================================
    let mut protected = Router::new()
        .route("/upload", post(handlers::upload_image))
        .route("/signedurl", post(handlers::create_signed_url))
        .layer(Extension(StorageTarget::Primary));

    if state.dev_storage.is_some() {
        let dev = Router::new()
            .route("/upload-dev", post(handlers::upload_image))
            .route("/signedurl-dev", post(handlers::create_signed_url))
            .layer(Extension(StorageTarget::Dev));
        protected = protected.merge(dev);
        info!("Dev bucket routes enabled (/upload-dev, /signedurl-dev)");
    }

    // =========================================================================
    // Gates (innermost layers; applied bottom to top, so the API key gate
    // runs before the allowlist gate)
    // =========================================================================
    if let Some(api_key) = config.api_key.clone() {
        info!("API key authentication enabled");

        if config.ip_allowlist_enabled() {
            info!(
                entries = config.allowed_ips.len(),
                "IP allowlist enabled"
            );
            protected = protected.layer(IpAllowlistGate::new(&config.allowed_ips));
        }

        protected = protected.layer(ApiKeyGate::new(api_key));
    } else {
        warn!("No API key configured - upload routes are exposed without authentication!");
    }

    // =========================================================================
    // Shared Stack (order matters - applied bottom to top)
    // =========================================================================
    let mut router = public.merge(protected);

    // 1. Request body size limit (file size plus multipart framing room)
    let body_limit = config.max_file_size + MULTIPART_OVERHEAD_BYTES;
    router = router.layer(DefaultBodyLimit::max(body_limit as usize));

    // 2. CORS - sees every request, answers every OPTIONS
    router = router.layer(CorsEnforcementLayer::new(&config.cors_allowed_origins));

    // 3. Request timeout - bounds handler plus storage I/O
    router = router.layer(TimeoutLayer::new(config.request_timeout));

    // 4. Request ID
    router = router.layer(RequestIdLayer::new());

    // 5. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // 6. Metrics - outermost, sees denials and preflights too
    router = router.layer(MetricsLayer::new());

    // Add state
    router.with_state(state)
}
