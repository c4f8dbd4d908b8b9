//! Shared application state for Axum handlers.
//!
//! This module provides thread-safe, clonable state that is shared across
//! all request handlers:
//!
//! - **Storage accessors**: the primary bucket and the optional dev bucket
//! - **Configuration**: the immutable access policy and runtime settings
//! - **Metrics handle**: the Prometheus exposition handle for `/metrics`
//!
//! # Thread Safety
//!
//! All components are wrapped in `Arc` (or are internally reference-counted)
//! and are safe for concurrent access from many simultaneous requests. The
//! configuration is never mutated after the serving loop starts.

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::storage::StorageAccessor;

/// Which storage bucket a protected route writes to.
///
/// Attached per route group as a request extension by the router composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTarget {
    /// The primary bucket (`/upload`, `/signedurl`)
    Primary,
    /// The dev bucket (`/upload-dev`, `/signedurl-dev`)
    Dev,
}

/// Shared application state for Axum handlers.
///
/// This struct is cloned for each request handler; all internal data is
/// reference-counted, so clones are cheap.
#[derive(Clone)]
pub struct AppState {
    /// Storage accessor for the primary bucket
    pub primary_storage: Arc<dyn StorageAccessor>,
    /// Storage accessor for the dev bucket, when configured
    pub dev_storage: Option<Arc<dyn StorageAccessor>>,
    /// Application configuration
    pub config: Arc<Config>,
    /// Prometheus exposition handle rendered by the `/metrics` route
    pub metrics: PrometheusHandle,
    /// Timestamp when the application started
    pub started_at: Instant,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        primary_storage: Arc<dyn StorageAccessor>,
        dev_storage: Option<Arc<dyn StorageAccessor>>,
        config: Config,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            primary_storage,
            dev_storage,
            config: Arc::new(config),
            metrics,
            started_at: Instant::now(),
        }
    }

    /// Resolve the storage accessor for a route's target.
    ///
    /// The dev target is only reachable through routes the composer registers
    /// when a dev bucket is configured, so the error arm here signals a
    /// wiring bug rather than a user-visible condition.
    pub fn storage_for(&self, target: StorageTarget) -> AppResult<&Arc<dyn StorageAccessor>> {
        match target {
            StorageTarget::Primary => Ok(&self.primary_storage),
            StorageTarget::Dev => self
                .dev_storage
                .as_ref()
                .ok_or_else(|| AppError::Internal("dev storage target not configured".to_string())),
        }
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
