//! Gateway's own endpoints: liveness and breaker status.
//!
//! Registered ahead of the catch-all proxy route, so these paths are never forwarded.

pub mod handlers;

use axum::{routing::get, Router};

use crate::http::server::AppState;
use self::handlers::*;

pub fn setup_admin_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(get_health))
        .route("/breaker-status", get(get_breaker_status))
}
