//! Stealth denial: reject a request without confirming the route exists.
//!
//! The auth and allowlist gates never answer a denied request with an error
//! status. Instead they close the underlying connection without writing a
//! single byte, so a probing client cannot distinguish "wrong key" from
//! "route does not exist". When connection-level control is unavailable
//! (e.g., a router driven directly in tests), the fallback is a bare 404
//! with an empty body, which reads the same as an unregistered route.
//!
//! # Mechanism
//!
//! The accept loop in [`crate::server`] owns each connection's serve future
//! and races it against a per-connection [`ConnectionDropHandle`] that it
//! plants in every request's extensions. A gate that wants to deny triggers
//! the handle and then parks its own future; the accept loop wins the race,
//! drops the serve future, and closes the socket. Nothing is ever written.

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Capability to close the current connection without writing a response.
///
/// Inserted into request extensions by the accept loop; one handle per
/// connection. Cloning shares the underlying token.
#[derive(Clone, Debug, Default)]
pub struct ConnectionDropHandle {
    token: CancellationToken,
}

impl ConnectionDropHandle {
    /// Create a fresh handle for a new connection.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request that the connection be dropped without a response.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Resolves once a gate has requested the drop.
    ///
    /// The accept loop races this against the connection's serve future.
    pub async fn dropped(&self) {
        self.token.cancelled().await;
    }

    /// Whether a drop has been requested.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Deny a request without revealing that the route exists.
///
/// With a [`ConnectionDropHandle`] present this never returns: the handle is
/// triggered and the future parks until the accept loop drops it along with
/// the connection. Without one, returns an empty-bodied 404.
pub fn stealth_deny<B>(
    req: &Request<B>,
    reason: &'static str,
) -> impl std::future::Future<Output = Response<Body>> + Send {
    // Extract everything we need from `req` synchronously so the returned
    // future captures only owned data. Holding a `&Request<Body>` across an
    // await would make the future non-`Send` (axum's `Body` is not `Sync`).
    let handle = req.extensions().get::<ConnectionDropHandle>().cloned();
    let path = req.uri().path().to_owned();
    async move {
        if let Some(handle) = handle {
            debug!(path = %path, reason, "closing connection without a response");
            handle.trigger();
            // Parked until the accept loop drops this future; guarantees no
            // status line or body is written in the meantime.
            return std::future::pending().await;
        }

        debug!(
            path = %path,
            reason,
            "no connection-level control available, answering with bare 404"
        );
        StatusCode::NOT_FOUND.into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_handle_starts_untriggered() {
        let handle = ConnectionDropHandle::new();
        assert!(!handle.is_triggered());
    }

    #[test]
    fn test_trigger_is_observable_through_clones() {
        let handle = ConnectionDropHandle::new();
        let clone = handle.clone();

        clone.trigger();
        assert!(handle.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_resolves_after_trigger() {
        let handle = ConnectionDropHandle::new();
        handle.trigger();

        // Must resolve immediately
        tokio::time::timeout(Duration::from_millis(100), handle.dropped())
            .await
            .expect("dropped() should resolve once triggered");
    }

    #[tokio::test]
    async fn test_stealth_deny_falls_back_to_404_without_handle() {
        let req = Request::builder().uri("/upload").body(()).unwrap();

        let response = stealth_deny(&req, "test").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stealth_deny_parks_with_handle() {
        let handle = ConnectionDropHandle::new();
        let mut req = Request::builder().uri("/upload").body(()).unwrap();
        req.extensions_mut().insert(handle.clone());

        // The denial future must trigger the handle and then never resolve;
        // the caller (the accept loop) is responsible for dropping it.
        let denial = stealth_deny(&req, "test");
        let raced = tokio::time::timeout(Duration::from_millis(100), denial).await;

        assert!(raced.is_err(), "stealth denial must not produce a response");
        assert!(handle.is_triggered());
    }
}
