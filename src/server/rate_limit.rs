//! Per-client request gate in front of the chat routes.

use crate::resilience::{KeyedRateLimiter, RateLimiterSnapshot};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// First `X-Forwarded-For` entry, else the peer IP.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Whole seconds until the bucket holds a token again, at least one.
pub fn retry_after_secs(snapshot: &RateLimiterSnapshot) -> u64 {
    snapshot
        .estimated_wait_ms
        .map(|ms| ms.div_ceil(1000))
        .unwrap_or(1)
        .max(1)
}

/// Rejects with 429 and a `Retry-After` hint once the caller's bucket is
/// empty. The handler is not run.
pub async fn limit_by_client(
    State(limiter): State<Arc<KeyedRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(request.headers(), peer);

    if limiter.try_acquire(&identity) {
        next.run(request).await
    } else {
        let snapshot = limiter.snapshot(&identity);
        let retry_after = retry_after_secs(&snapshot);
        warn!(
            client = %identity,
            tokens = snapshot.tokens,
            retry_after_secs = retry_after,
            "rate limit exceeded"
        );
        (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, HeaderValue::from(retry_after))],
            Json(serde_json::json!({"error": "Too many requests"})),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.10:54321".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_first_entry_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        assert_eq!(client_identity(&headers, peer()), "203.0.113.7");
    }

    #[test]
    fn test_peer_address_without_header() {
        assert_eq!(client_identity(&HeaderMap::new(), peer()), "192.0.2.10");
    }

    #[test]
    fn test_blank_header_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 10.0.0.1"));
        assert_eq!(client_identity(&headers, peer()), "192.0.2.10");
        assert_eq!(client_identity(&headers, None), "unknown");
    }

    fn snapshot(wait_ms: Option<u64>) -> RateLimiterSnapshot {
        RateLimiterSnapshot {
            rps: 1.0,
            burst: 60.0,
            tokens: 0.0,
            estimated_wait_ms: wait_ms,
        }
    }

    #[test]
    fn test_retry_after_rounds_up_to_whole_seconds() {
        assert_eq!(retry_after_secs(&snapshot(Some(29_400))), 30);
        assert_eq!(retry_after_secs(&snapshot(Some(30_000))), 30);
        assert_eq!(retry_after_secs(&snapshot(Some(10))), 1);
        assert_eq!(retry_after_secs(&snapshot(Some(0))), 1);
        assert_eq!(retry_after_secs(&snapshot(None)), 1);
    }
}
