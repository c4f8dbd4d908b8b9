//! HTTP middleware: the request-gating pipeline and its observability.
//!
//! This module provides the gates that decide whether a request may reach the
//! protected upload handlers, and the instrumentation around them:
//!
//! - **API Key Gate**: shared-secret check with stealth denial
//! - **IP Allowlist Gate**: exact and CIDR allowlisting with stealth denial
//! - **CORS Enforcement**: origin reflection and preflight short-circuit
//! - **Metrics**: outermost request counters and latency histograms
//! - **Request ID**: `X-Request-Id` generation and propagation
//!
//! # Pipeline Order
//!
//! ```text
//! Request → Metrics → Trace → Request ID → CORS → API Key → IP Allowlist → Handler
//!              ↑                             ↓        ↓           ↓
//!        every request except        OPTIONS: 204   dropped connection or
//!        /metrics itself             short-circuit  bare 404, never a 401/403
//! ```
//!
//! The gates are strictly sequential per request with short-circuit on the
//! first denial; none of them blocks or performs I/O.
//!
//! # Security Considerations
//!
//! - Denied requests (wrong key, disallowed IP) terminate the connection
//!   without any response so the route's existence is never confirmed
//! - A disallowed CORS origin is a soft denial: the request proceeds and the
//!   browser enforces the missing header
//! - Client IP headers are spoofable unless the gateway sits behind a trusted
//!   edge proxy; see [`client_ip`]

pub mod auth;
pub mod client_ip;
pub mod cors;
pub mod denial;
pub mod ip_allowlist;
pub mod metrics;
pub mod request_id;

pub use auth::{API_KEY_HEADER, ApiKeyGate};
pub use client_ip::{ClientIdentity, UNKNOWN_IP, resolve_client_ip, resolve_client_ip_parts};
pub use cors::CorsEnforcementLayer;
pub use denial::ConnectionDropHandle;
pub use ip_allowlist::{IpAllowlist, IpAllowlistGate};
pub use metrics::MetricsLayer;
pub use request_id::RequestIdLayer;
