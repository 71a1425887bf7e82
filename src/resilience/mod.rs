//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → registry.rs (breaker for the matched route)
//!     → circuit_breaker.rs (allow? → forward → record outcome)
//!     → timeouts.rs (deadline on the forwarded call)
//!
//! Breaker opens:
//!     → recovery.rs (timer task, OPEN → HALF_OPEN after open_timeout)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every forwarded call has a deadline
//! - No retries: a failed forward is reported, never replayed
//! - Circuit breaker prevents cascading failures

pub mod circuit_breaker;
pub mod recovery;
pub mod registry;
pub mod timeouts;

pub use circuit_breaker::{Breaker, BreakerSettings, BreakerSnapshot, BreakerStatus, Transition};
pub use recovery::{RecoveryScheduler, RecoveryTicket, TokioRecoveryScheduler};
pub use registry::BreakerRegistry;
