//! Client IP resolution shared by the allowlist gate and the metrics layer.
//!
//! # Performance
//!
//! - Returns `Cow<'static, str>` to avoid allocation for the "unknown" fallback
//! - Header parsing short-circuits on the first match
//! - `#[inline]` hints on hot paths for potential inlining
//!
//! # Security Warning: IP Spoofing Risk
//!
//! **These functions trust client-provided headers.** Malicious clients can
//! spoof their IP address by setting `CF-Connecting-IP`, `X-Real-IP`, or
//! `X-Forwarded-For` directly if the gateway is reachable without passing
//! through the edge proxy. Deploy behind Cloudflare (or another trusted
//! reverse proxy that overwrites these headers) and block direct access,
//! otherwise the IP allowlist can be bypassed by anyone who can reach the
//! listener.
//!
//! No syntactic validation happens here; the resolver's only job is to pick
//! the most authoritative address string. The allowlist gate parses the result
//! and denies anything that is not a valid IP.

use std::borrow::Cow;
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request};

/// Fallback value when neither headers nor transport peer info identify
/// the client (e.g., a router driven directly in tests).
pub const UNKNOWN_IP: &str = "unknown";

/// Cloudflare's connecting-IP header, set by the edge proxy/tunnel.
/// Highest priority: it survives intermediate proxies rewriting XFF.
const CF_CONNECTING_IP: &str = "cf-connecting-ip";

/// Real-IP header, often set by reverse proxies such as nginx.
const X_REAL_IP: &str = "x-real-ip";

/// Forwarded-for header; format "client, proxy1, proxy2".
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the client IP for a request.
///
/// Priority order (first non-empty header wins):
/// 1. `CF-Connecting-IP`
/// 2. `X-Real-IP`
/// 3. `X-Forwarded-For` (first comma-separated entry, trimmed)
/// 4. Transport peer address from the `ConnectInfo` extension, port stripped
///
/// Falls back to [`UNKNOWN_IP`] when nothing identifies the client.
/// Infallible and side-effect free.
#[inline]
pub fn resolve_client_ip<B>(req: &Request<B>) -> Cow<'static, str> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    resolve_client_ip_parts(req.headers(), peer)
}

/// Header/peer variant of [`resolve_client_ip`] for handlers that no longer
/// hold the whole request (e.g., after body extraction).
#[inline]
pub fn resolve_client_ip_parts(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Cow<'static, str> {
    if let Some(ip) = header_value(headers, CF_CONNECTING_IP) {
        return Cow::Owned(ip.trim().to_string());
    }

    if let Some(ip) = header_value(headers, X_REAL_IP) {
        return Cow::Owned(ip.trim().to_string());
    }

    // First entry is the original client; later entries are intermediate
    // proxies appended along the way
    if let Some(forwarded) = header_value(headers, X_FORWARDED_FOR)
        && let Some(first_ip) = forwarded.split(',').next()
    {
        return Cow::Owned(first_ip.trim().to_string());
    }

    // SocketAddr::ip() strips the port; the raw peer address never reaches
    // the caller in unparsed form
    if let Some(addr) = peer {
        return Cow::Owned(addr.ip().to_string());
    }

    Cow::Borrowed(UNKNOWN_IP)
}

/// Fetch a header as a non-empty string slice.
#[inline]
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Extractor form of the resolver for handlers that consume the body through
/// another extractor and therefore cannot call [`resolve_client_ip`] on the
/// whole request.
#[derive(Debug, Clone)]
pub struct ClientIdentity(pub String);

impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Self(
            resolve_client_ip_parts(&parts.headers, peer).into_owned(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_headers(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_cf_connecting_ip_wins() {
        let req = request_with_headers(&[
            ("cf-connecting-ip", "1.1.1.1"),
            ("x-real-ip", "3.3.3.3"),
            ("x-forwarded-for", "2.2.2.2"),
        ]);

        assert_eq!(resolve_client_ip(&req), "1.1.1.1");
    }

    #[test]
    fn test_real_ip_beats_forwarded_for() {
        let req = request_with_headers(&[
            ("x-real-ip", "3.3.3.3"),
            ("x-forwarded-for", "2.2.2.2"),
        ]);

        assert_eq!(resolve_client_ip(&req), "3.3.3.3");
    }

    #[test]
    fn test_forwarded_for_first_entry() {
        let req = request_with_headers(&[("x-forwarded-for", "203.0.113.50, 10.0.0.1, 10.0.0.2")]);

        assert_eq!(resolve_client_ip(&req), "203.0.113.50");
    }

    #[test]
    fn test_forwarded_for_trims_whitespace() {
        let req = request_with_headers(&[("x-forwarded-for", "  192.168.1.1  , 10.0.0.1")]);

        assert_eq!(resolve_client_ip(&req), "192.168.1.1");
    }

    #[test]
    fn test_empty_header_falls_through() {
        let req = request_with_headers(&[
            ("cf-connecting-ip", ""),
            ("x-real-ip", "3.3.3.3"),
        ]);

        assert_eq!(resolve_client_ip(&req), "3.3.3.3");
    }

    #[test]
    fn test_peer_address_port_stripped() {
        let mut req = request_with_headers(&[]);
        let addr: SocketAddr = "198.51.100.7:54321".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));

        assert_eq!(resolve_client_ip(&req), "198.51.100.7");
    }

    #[test]
    fn test_ipv6_peer_address() {
        let mut req = request_with_headers(&[]);
        let addr: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));

        assert_eq!(resolve_client_ip(&req), "2001:db8::1");
    }

    #[test]
    fn test_headers_beat_peer_address() {
        let mut req = request_with_headers(&[("cf-connecting-ip", "1.1.1.1")]);
        let addr: SocketAddr = "198.51.100.7:54321".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));

        assert_eq!(resolve_client_ip(&req), "1.1.1.1");
    }

    #[test]
    fn test_unknown_without_headers_or_peer() {
        let req = request_with_headers(&[]);

        let ip = resolve_client_ip(&req);
        assert_eq!(ip, UNKNOWN_IP);
        // No allocation for the fallback
        assert!(matches!(ip, Cow::Borrowed(_)));
    }

    #[test]
    fn test_forwarded_for_with_ipv6() {
        let req = request_with_headers(&[("x-forwarded-for", "2001:db8::1, 10.0.0.1")]);

        assert_eq!(resolve_client_ip(&req), "2001:db8::1");
    }

    #[test]
    fn test_no_validation_performed() {
        // Garbage survives resolution; the allowlist gate is the validator
        let req = request_with_headers(&[("x-real-ip", "not-an-ip")]);

        assert_eq!(resolve_client_ip(&req), "not-an-ip");
    }
}
