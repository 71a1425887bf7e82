//! Response handling.
//!
//! # Responsibilities
//! - Map gateway errors to HTTP status codes and plain-text bodies
//! - Strip hop-by-hop headers from forwarded messages
//!
//! # Design Decisions
//! - An open circuit is a 503, never a panic or a 500
//! - Unreachable backends are 502, backend timeouts 504
//! - Bodies are plain text so clients and operators can read them directly

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::GatewayError;

/// Headers meaningful only for a single transport hop.
const HOP_BY_HOP: [header::HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including those named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    for name in named {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BackendUnreachable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = match &self {
            GatewayError::RouteNotFound(_) => "No matching route found".to_string(),
            GatewayError::CircuitOpen(route) => {
                format!("Service temporarily unavailable. Circuit is OPEN for {route}")
            }
            GatewayError::BackendUnreachable { route, .. } => {
                format!("Upstream request failed for {route}")
            }
            GatewayError::BackendTimeout { route, .. } => {
                format!("Upstream request timed out for {route}")
            }
            GatewayError::InvalidConfig(_) | GatewayError::InvalidRequest(_) => self.to_string(),
        };
        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_circuit_open_response() {
        let response = GatewayError::CircuitOpen("/svc1".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            &body[..],
            b"Service temporarily unavailable. Circuit is OPEN for /svc1"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::RouteNotFound("/x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::BackendUnreachable { route: "/a".into(), reason: "refused".into() }
                .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::BackendTimeout {
                route: "/a".into(),
                timeout: std::time::Duration::from_secs(1)
            }
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-trace", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }
}
