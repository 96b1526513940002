//! Client address resolution.
//!
//! The leftmost `x-forwarded-for` entry wins; otherwise the TCP peer from
//! [`ConnectInfo`] is used. Nothing is validated: the forwarded value is
//! client-controlled and only suitable for record keeping.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the originating address of a request.
///
/// Returns an empty string when neither a forwarded address nor a peer is known.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    leftmost_forwarded_for(headers)
        .or_else(|| peer.map(|addr| addr.ip().to_canonical().to_string()))
        .unwrap_or_default()
}

fn leftmost_forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_FORWARDED_FOR)
        .and_then(|hv| hv.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Extractor for the resolved client address. Never rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Self(resolve_client_ip(&parts.headers, peer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(xff: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(xff).unwrap());
        headers
    }

    fn peer(addr: &str) -> Option<SocketAddr> {
        Some(addr.parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_leftmost_entry() {
        let ip = resolve_client_ip(&headers("203.0.113.5, 10.0.0.1"), peer("10.0.0.2:4000"));
        assert_eq!(ip, "203.0.113.5");
    }

    #[test]
    fn test_forwarded_for_is_trimmed() {
        let ip = resolve_client_ip(&headers("   203.0.113.5   "), None);
        assert_eq!(ip, "203.0.113.5");
    }

    #[test]
    fn test_forwarded_for_is_not_validated() {
        let ip = resolve_client_ip(&headers("unknown, 10.0.0.1"), peer("10.0.0.2:4000"));
        assert_eq!(ip, "unknown");
    }

    #[test]
    fn test_empty_leftmost_entry_falls_back_to_peer() {
        let ip = resolve_client_ip(&headers(" , 10.0.0.1"), peer("198.51.100.7:5555"));
        assert_eq!(ip, "198.51.100.7");
    }

    #[test]
    fn test_empty_header_falls_back_to_peer() {
        let ip = resolve_client_ip(&headers(""), peer("198.51.100.7:5555"));
        assert_eq!(ip, "198.51.100.7");
    }

    #[test]
    fn test_peer_without_header() {
        let ip = resolve_client_ip(&HeaderMap::new(), peer("198.51.100.7:5555"));
        assert_eq!(ip, "198.51.100.7");
    }

    #[test]
    fn test_ipv4_mapped_peer_is_canonical() {
        let ip = resolve_client_ip(&HeaderMap::new(), peer("[::ffff:198.51.100.7]:5555"));
        assert_eq!(ip, "198.51.100.7");
    }

    #[test]
    fn test_ipv6_peer() {
        let ip = resolve_client_ip(&HeaderMap::new(), peer("[2001:db8::1]:5555"));
        assert_eq!(ip, "2001:db8::1");
    }

    #[test]
    fn test_nothing_resolves_to_empty_string() {
        assert_eq!(resolve_client_ip(&HeaderMap::new(), None), "");
    }

    #[tokio::test]
    async fn test_extractor_reads_connect_info() {
        let request = axum::http::Request::builder()
            .uri("/")
            .extension(ConnectInfo::<SocketAddr>("198.51.100.7:5555".parse().unwrap()))
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ip, "198.51.100.7");
    }
}
