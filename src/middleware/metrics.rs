//! Request instrumentation layer.
//!
//! Outermost layer of the pipeline: it observes every request - forwarded,
//! denied with a 404 fallback, or preflight-answered - except requests to the
//! metrics exposition route itself, which pass through uninstrumented to keep
//! the endpoint from feeding its own counters.
//!
//! Per request it records:
//!
//! - a duration histogram keyed by (method, endpoint), observed on completion
//!   regardless of outcome;
//! - a request counter keyed by (method, endpoint, status_code, hostname,
//!   client_ip), using the status of the response the downstream layers
//!   produced.
//!
//! A stealth-dropped connection never completes a response, so it leaves no
//! sample; there is no status code to label it with.

use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::header::HOST;
use axum::http::{Request, Response};
use tower::{Layer, Service};

use super::client_ip::resolve_client_ip;
use crate::metrics::{record_request, record_request_duration};

/// Path excluded from instrumentation.
const METRICS_PATH: &str = "/metrics";

/// Request instrumentation layer.
#[derive(Clone, Default)]
pub struct MetricsLayer;

impl MetricsLayer {
    /// Create a new instrumentation layer.
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

/// Request instrumentation service wrapper.
#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for MetricsService<S>
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
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // Skip the exposition route to avoid self-referential counting
            if req.uri().path() == METRICS_PATH {
                return inner.call(req).await;
            }

            let method = req.method().to_string();
            let endpoint = req.uri().path().to_string();
            let hostname = req
                .headers()
                .get(HOST)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let client_ip = resolve_client_ip(&req).into_owned();

            let started = Instant::now();
            let response = inner.call(req).await?;
            let elapsed = started.elapsed();

            record_request_duration(&method, &endpoint, elapsed.as_secs_f64());
            record_request(
                &method,
                &endpoint,
                response.status().as_str(),
                &hostname,
                &client_ip,
            );

            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use tower::ServiceExt;

    async fn ok_handler(_req: Request<Body>) -> Result<Response<Body>, std::convert::Infallible> {
        Ok(StatusCode::OK.into_response())
    }

    #[tokio::test]
    async fn test_layer_passes_request_through() {
        let service = MetricsLayer::new().layer(tower::service_fn(ok_handler));

        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("host", "localhost:8080")
            .header("x-real-ip", "203.0.113.5")
            .body(Body::empty())
            .unwrap();

        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_route_passes_through() {
        let service = MetricsLayer::new().layer(tower::service_fn(ok_handler));

        let req = Request::builder()
            .method("GET")
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();

        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
