//! HTTP gateway with a per-route circuit breaker.
//!
//! Requests are matched to a backend by path prefix. Each route's breaker
//! refuses traffic once failures cross the configured threshold, waits out
//! the open timeout, then lets a trial batch decide whether to close again.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
