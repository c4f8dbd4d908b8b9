//! Public endpoints: health check and metrics exposition.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness check, always 200
//! - `GET /metrics` - Prometheus text exposition
//!
//! Both are public routes: they never pass through the API key or IP
//! allowlist gates, so load balancers and scrapers work without credentials.

use axum::Json;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// { "status": "healthy", "message": "Image upload gateway is running" }
/// ```
#[instrument(skip_all)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "Image upload gateway is running".to_string(),
    })
}

/// Prometheus metrics exposition endpoint.
///
/// Renders the process-wide registry in the text exposition format. The
/// instrumentation layer skips this route, so scraping does not feed the
/// request counters.
#[instrument(skip_all)]
pub async fn metrics_exposition(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
