//! Gateway error types.
//!
//! Mapping to HTTP responses lives in `http::response`.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the gateway core.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Out-of-range breaker settings or an unusable route table. Fatal at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No configured route matches the request path.
    #[error("no route matches path {0}")]
    RouteNotFound(String),

    /// The request cannot be mapped onto the backend.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The breaker for this route is OPEN.
    #[error("circuit is open for {0}")]
    CircuitOpen(String),

    /// The backend could not be reached (connect failure, broken stream).
    #[error("backend for {route} unreachable: {reason}")]
    BackendUnreachable { route: String, reason: String },

    /// The backend did not answer within the forwarding deadline.
    #[error("backend for {route} timed out after {timeout:?}")]
    BackendTimeout { route: String, timeout: Duration },
}
