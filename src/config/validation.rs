//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds, trial counts, timeouts)
//! - Detect conflicting or malformed routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// Paths served by the gateway itself.
pub const RESERVED_PATHS: &[&str] = &["/health", "/breaker-status"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("no routes configured")]
    NoRoutes,

    #[error("route prefix {0:?} must start with '/' and must not end with '/'")]
    RoutePrefix(String),

    #[error("route prefix {0:?} is configured more than once")]
    DuplicateRoute(String),

    #[error("route prefix {0:?} shadows a gateway endpoint")]
    ReservedRoute(String),

    #[error("backend {backend:?} for route {prefix:?} is not a valid http URL")]
    Backend { prefix: String, backend: String },

    #[error("failure threshold must be in (0, 1], got {0}")]
    FailureThreshold(f64),

    #[error("max half-open trials must be at least 1")]
    HalfOpenTrials,

    #[error("open timeout must be greater than zero")]
    OpenTimeout,

    #[error("backend timeout must be non-zero and shorter than the request timeout")]
    BackendTimeout,

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::NoRoutes);
    }

    let mut seen = HashSet::new();
    for route in &config.routes {
        let prefix = route.prefix.as_str();
        let well_formed = prefix == "/" || (prefix.starts_with('/') && !prefix.ends_with('/'));
        if !well_formed {
            errors.push(ValidationError::RoutePrefix(route.prefix.clone()));
        }
        if !seen.insert(prefix) {
            errors.push(ValidationError::DuplicateRoute(route.prefix.clone()));
        }
        if RESERVED_PATHS
            .iter()
            .any(|reserved| *reserved == prefix || reserved.starts_with(&format!("{prefix}/")))
        {
            errors.push(ValidationError::ReservedRoute(route.prefix.clone()));
        }
        let backend_ok = Url::parse(&route.backend)
            .map(|url| url.scheme() == "http" && url.host().is_some())
            .unwrap_or(false);
        if !backend_ok {
            errors.push(ValidationError::Backend {
                prefix: route.prefix.clone(),
                backend: route.backend.clone(),
            });
        }
    }

    let threshold = config.breaker.failure_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        errors.push(ValidationError::FailureThreshold(threshold));
    }
    if config.breaker.max_half_open_trials < 1 {
        errors.push(ValidationError::HalfOpenTrials);
    }
    if config.breaker.open_timeout_ms == 0 {
        errors.push(ValidationError::OpenTimeout);
    }

    // An outer timeout firing first would drop the outcome before it is recorded.
    let request_ms = config.timeouts.request_secs.saturating_mul(1000);
    if config.timeouts.backend_ms == 0 || config.timeouts.backend_ms >= request_ms {
        errors.push(ValidationError::BackendTimeout);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
