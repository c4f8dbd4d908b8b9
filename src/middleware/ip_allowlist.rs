//! Client IP allowlist gate for the protected upload routes.
//!
//! The allowlist mixes two kinds of entries: anything containing a `/` is
//! parsed as a CIDR block and tested for membership; everything else is an
//! exact string comparison against the resolved client IP. Entries that fail
//! to parse as CIDR are skipped with a warning at construction time, so one
//! malformed entry cannot lock out all traffic.
//!
//! A client IP that does not parse as a valid IP address is always denied;
//! the resolver upstream performs no validation of its own.
//!
//! Denial uses the same stealth behavior as the API key gate: close the
//! connection without a response, or a bare 404 when connection-level control
//! is unavailable. See [`super::denial`].

use std::net::IpAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::client_ip::resolve_client_ip;
use super::denial::stealth_deny;

// =============================================================================
// CIDR Matching
// =============================================================================

/// Parsed CIDR network range.
#[derive(Debug, Clone)]
pub struct CidrRange {
    /// Network address
    network: IpAddr,
    /// Prefix length (e.g., 24 for /24)
    prefix_len: u8,
}

impl CidrRange {
    /// Parse a CIDR notation string (e.g., "10.0.0.0/8" or "::1/128").
    ///
    /// Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, prefix) = cidr.trim().split_once('/')?;

        let network: IpAddr = addr.parse().ok()?;
        let prefix_len: u8 = prefix.parse().ok()?;

        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };

        if prefix_len > max_prefix {
            return None;
        }

        Some(Self {
            network,
            prefix_len,
        })
    }

    /// Check if an IP address is contained within this CIDR range.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let net_bits = u32::from(*net);
                let addr_bits = u32::from(*addr);
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - self.prefix_len)
                };
                (net_bits & mask) == (addr_bits & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let net_bits = u128::from(*net);
                let addr_bits = u128::from(*addr);
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    u128::MAX << (128 - self.prefix_len)
                };
                (net_bits & mask) == (addr_bits & mask)
            }
            // IPv4 and IPv6 don't match
            _ => false,
        }
    }
}

/// One allowlist entry: a CIDR block or an exact address string.
#[derive(Debug, Clone)]
enum AllowlistEntry {
    /// Membership test against a network range
    Cidr(CidrRange),
    /// Literal string comparison against the resolved client IP
    Exact(String),
}

/// Compiled allowlist shared by the layer and its services.
#[derive(Debug, Clone, Default)]
pub struct IpAllowlist {
    entries: Vec<AllowlistEntry>,
}

impl IpAllowlist {
    /// Compile an allowlist from configured entry strings.
    ///
    /// Entries containing `/` must parse as CIDR; failures are logged and
    /// skipped rather than treated as fatal. Entries without `/` are kept
    /// verbatim for exact comparison.
    pub fn new(configured: &[String]) -> Self {
        let entries = configured
            .iter()
            .filter_map(|entry| {
                if entry.contains('/') {
                    let parsed = CidrRange::parse(entry);
                    if parsed.is_none() {
                        warn!(entry = %entry, "Invalid CIDR in ALLOWED_IPS, skipping entry");
                    }
                    parsed.map(AllowlistEntry::Cidr)
                } else {
                    Some(AllowlistEntry::Exact(entry.clone()))
                }
            })
            .collect();

        Self { entries }
    }

    /// Whether the compiled list has no usable entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a resolved client IP is allowed.
    ///
    /// Unparseable client IPs are denied outright.
    pub fn is_allowed(&self, client_ip: &str) -> bool {
        let Ok(parsed) = client_ip.parse::<IpAddr>() else {
            return false;
        };

        self.entries.iter().any(|entry| match entry {
            AllowlistEntry::Cidr(range) => range.contains(&parsed),
            AllowlistEntry::Exact(allowed) => allowed == client_ip,
        })
    }
}

// =============================================================================
// Tower Layer
// =============================================================================

/// IP allowlist layer for the protected routes.
///
/// The composer installs this only when the configured allowlist is
/// non-empty; an empty allowlist means all client IPs are allowed.
#[derive(Clone)]
pub struct IpAllowlistGate {
    allowlist: Arc<IpAllowlist>,
}

impl IpAllowlistGate {
    /// Create a gate from configured entry strings.
    pub fn new(configured: &[String]) -> Self {
        Self {
            allowlist: Arc::new(IpAllowlist::new(configured)),
        }
    }
}

impl<S> Layer<S> for IpAllowlistGate {
    type Service = IpAllowlistGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IpAllowlistGateService {
            inner,
            allowlist: self.allowlist.clone(),
        }
    }
}

/// IP allowlist service wrapper.
#[derive(Clone)]
pub struct IpAllowlistGateService<S> {
    inner: S,
    allowlist: Arc<IpAllowlist>,
}

impl<S> Service<Request<Body>> for IpAllowlistGateService<S>
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
        let allowlist = self.allowlist.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let client_ip = resolve_client_ip(&req);

            if !allowlist.is_allowed(&client_ip) {
                warn!(
                    client_ip = %client_ip,
                    path = %req.uri().path(),
                    "client IP not in allowlist"
                );
                return Ok(stealth_deny(&req, "ip not allowed").await);
            }

            debug!(client_ip = %client_ip, "client IP allowed");
            inner.call(req).await
        })
    }
}
