//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, tracing)
//!     → dispatcher.rs (route match, breaker gate, outcome recording)
//!     → forward.rs (rewrite URI, call backend)
//!     → response.rs (error mapping, header hygiene)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use dispatcher::GatewayDispatcher;
pub use forward::{ForwardError, Forwarder, HyperForwarder};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
