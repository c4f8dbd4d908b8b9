//! # Upload Gateway
//!
//! An API-gated image upload gateway for Google Cloud Storage built on Axum,
//! featuring:
//!
//! - **Stealth access control**: denied requests get a dropped connection,
//!   never a status code that confirms the route exists
//! - **IP allowlisting**: exact addresses and CIDR blocks
//! - **CORS enforcement**: origin reflection and preflight handling
//! - **Observability**: Prometheus metrics, request IDs, structured logging
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │           Accept loop (connection drop capability)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Metrics → Trace → Request ID → CORS →          │
//! │              API Key → IP Allowlist)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, metrics, upload, signed URL)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  StorageAccessor (GCS buckets, pre-signed URLs)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use upload_gateway::{AppState, Config, GcsStore, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = Arc::new(GcsStore::connect(
//!         &config.bucket_name,
//!         &config.service_account_path,
//!     )?);
//!     let metrics = upload_gateway::metrics::init_metrics()?;
//!
//!     let state = AppState::new(storage, None, config, metrics);
//!     let app = build_router(state);
//!
//!     // Serve with upload_gateway::server::serve(listener, app)...
//!     Ok(())
//! }
//! ```
//!
//! ## Security Configuration
//!
//! Enable API key authentication:
//! ```bash
//! API_KEY=your-secret-key cargo run
//! ```
//!
//! Restrict client IPs:
//! ```bash
//! ALLOWED_IPS=203.0.113.0/24,198.51.100.7 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;
pub mod storage;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::{AppState, StorageTarget};
pub use storage::{GcsStore, StorageAccessor};
