//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_breaker_rejections_total` (counter): requests refused by an open circuit
//! - `gateway_breaker_transitions_total` (counter): status changes by route, from, to
//! - `gateway_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed (tests never install one)
//! - Labels for route and status code only; no per-request IDs

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::{BreakerStatus, Transition};

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished request (forwarded, rejected or unmatched).
pub fn record_request(route: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_breaker_rejection(route: &str) {
    ::metrics::counter!("gateway_breaker_rejections_total", "route" => route.to_string()).increment(1);
}

pub fn record_breaker_transition(route: &str, transition: Transition) {
    ::metrics::counter!(
        "gateway_breaker_transitions_total",
        "route" => route.to_string(),
        "from" => transition.from.as_str(),
        "to" => transition.to.as_str()
    )
    .increment(1);
    set_breaker_state(route, transition.to);
}

pub fn set_breaker_state(route: &str, status: BreakerStatus) {
    let value = match status {
        BreakerStatus::Closed => 0.0,
        BreakerStatus::Open => 1.0,
        BreakerStatus::HalfOpen => 2.0,
    };
    ::metrics::gauge!("gateway_breaker_state", "route" => route.to_string()).set(value);
}
