//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: a batch of trial requests probes the backend
//!
//! # State Transitions
//! ```text
//! Closed → Open: first failed outcome
//! Open → Half-Open: recovery timer fires (same OPEN period only)
//! Half-Open → Closed: batch of max_half_open_trials with failure rate < threshold
//! Half-Open → Open: batch of max_half_open_trials with failure rate >= threshold
//! ```
//!
//! # Design Decisions
//! - Per-route circuit breaker (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Status and every counter share one mutex; the timer path takes the same lock
//! - The lock is never held across forwarding or while a timer sleeps

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::GatewayError;
use crate::observability::metrics;
use crate::resilience::recovery::{RecoveryScheduler, RecoveryTicket};

/// Breaker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerStatus {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl BreakerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerStatus::Closed => "CLOSED",
            BreakerStatus::Open => "OPEN",
            BreakerStatus::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BreakerStatus,
    pub to: BreakerStatus,
}

/// Tunables shared by every breaker in a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSettings {
    /// Failure rate in (0, 1] at or above which a half-open batch reopens the circuit.
    pub failure_threshold: f64,
    /// Time spent OPEN before trial requests are admitted.
    pub open_timeout: Duration,
    /// Outcomes collected in HALF_OPEN before deciding.
    pub max_half_open_trials: u32,
}

impl BreakerSettings {
    /// Reject settings the state machine cannot run with.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if !(self.failure_threshold > 0.0 && self.failure_threshold <= 1.0) {
            return Err(GatewayError::InvalidConfig(format!(
                "failure threshold must be in (0, 1], got {}",
                self.failure_threshold
            )));
        }
        if self.max_half_open_trials < 1 {
            return Err(GatewayError::InvalidConfig(
                "max half-open trials must be at least 1".to_string(),
            ));
        }
        if self.open_timeout.is_zero() {
            return Err(GatewayError::InvalidConfig(
                "open timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            open_timeout: Duration::from_secs(10),
            max_half_open_trials: 5,
        }
    }
}

/// Point-in-time copy of a breaker, taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BreakerSnapshot {
    pub status: BreakerStatus,
    pub request_count: u64,
    pub success_count: u64,
    pub half_open_request_count: u64,
    pub half_open_success_count: u64,
}

impl BreakerSnapshot {
    /// Failure ratio of the active phase, `None` when nothing was recorded yet.
    ///
    /// HALF_OPEN reads the trial counters; CLOSED and OPEN read the closed-phase
    /// counters (OPEN keeps the numbers that tripped it).
    pub fn failure_rate(&self) -> Option<f64> {
        let (total, succeeded) = match self.status {
            BreakerStatus::HalfOpen => (self.half_open_request_count, self.half_open_success_count),
            BreakerStatus::Closed | BreakerStatus::Open => (self.request_count, self.success_count),
        };
        if total == 0 {
            return None;
        }
        Some((total - succeeded) as f64 / total as f64)
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    status: BreakerStatus,
    request_count: u64,
    success_count: u64,
    half_open_request_count: u64,
    half_open_success_count: u64,
    /// Bumped on every entry into OPEN; recovery tickets carry the value they were issued for.
    open_epoch: u64,
}

impl BreakerState {
    fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            status: self.status,
            request_count: self.request_count,
            success_count: self.success_count,
            half_open_request_count: self.half_open_request_count,
            half_open_success_count: self.half_open_success_count,
        }
    }

    fn reset_half_open(&mut self) {
        self.half_open_request_count = 0;
        self.half_open_success_count = 0;
    }

    fn trip(&mut self) -> u64 {
        self.status = BreakerStatus::Open;
        self.reset_half_open();
        self.open_epoch += 1;
        self.open_epoch
    }

    fn close(&mut self) {
        self.status = BreakerStatus::Closed;
        self.reset_half_open();
        self.request_count = 0;
        self.success_count = 0;
    }
}

enum Applied {
    Counted,
    Ignored,
    Moved(Transition),
    Tripped(Transition, u64),
}

/// Circuit breaker guarding a single route.
#[derive(Debug)]
pub struct Breaker {
    route: String,
    settings: BreakerSettings,
    state: Mutex<BreakerState>,
    scheduler: Arc<dyn RecoveryScheduler>,
}

impl Breaker {
    /// Create a CLOSED breaker with zeroed counters.
    pub fn new(
        route: impl Into<String>,
        settings: BreakerSettings,
        scheduler: Arc<dyn RecoveryScheduler>,
    ) -> Result<Arc<Self>, GatewayError> {
        settings.validate()?;
        Ok(Arc::new(Self {
            route: route.into(),
            settings,
            state: Mutex::new(BreakerState::default()),
            scheduler,
        }))
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// True while CLOSED or HALF_OPEN. Never waits on the recovery timer.
    pub fn allow_request(&self) -> bool {
        let state = self.state.lock();
        matches!(state.status, BreakerStatus::Closed | BreakerStatus::HalfOpen)
    }

    pub fn status(&self) -> BreakerStatus {
        self.state.lock().status
    }

    pub fn failure_rate(&self) -> Option<f64> {
        self.state.lock().snapshot().failure_rate()
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.state.lock().snapshot()
    }

    /// Record the outcome of one admitted request.
    ///
    /// Call exactly once per request for which `allow_request` returned true.
    /// Outcomes landing while OPEN belong to an earlier phase and are dropped.
    pub fn record_outcome(self: &Arc<Self>, success: bool) -> Option<Transition> {
        let applied = {
            let mut state = self.state.lock();
            match state.status {
                BreakerStatus::Closed => {
                    state.request_count += 1;
                    if success {
                        state.success_count += 1;
                        Applied::Counted
                    } else {
                        let epoch = state.trip();
                        Applied::Tripped(
                            Transition { from: BreakerStatus::Closed, to: BreakerStatus::Open },
                            epoch,
                        )
                    }
                }
                BreakerStatus::HalfOpen => {
                    state.half_open_request_count += 1;
                    if success {
                        state.half_open_success_count += 1;
                    }
                    if state.half_open_request_count < u64::from(self.settings.max_half_open_trials) {
                        Applied::Counted
                    } else {
                        let failure_rate = state.snapshot().failure_rate().unwrap_or(0.0);
                        if failure_rate >= self.settings.failure_threshold {
                            let epoch = state.trip();
                            Applied::Tripped(
                                Transition { from: BreakerStatus::HalfOpen, to: BreakerStatus::Open },
                                epoch,
                            )
                        } else {
                            state.close();
                            Applied::Moved(Transition {
                                from: BreakerStatus::HalfOpen,
                                to: BreakerStatus::Closed,
                            })
                        }
                    }
                }
                BreakerStatus::Open => Applied::Ignored,
            }
        };

        match applied {
            Applied::Counted => None,
            Applied::Ignored => {
                tracing::debug!(route = %self.route, success, "Outcome ignored, circuit is open");
                None
            }
            Applied::Moved(transition) => {
                self.on_transition(transition);
                Some(transition)
            }
            Applied::Tripped(transition, epoch) => {
                self.scheduler.schedule(
                    RecoveryTicket::new(Arc::downgrade(self), epoch),
                    self.settings.open_timeout,
                );
                self.on_transition(transition);
                Some(transition)
            }
        }
    }

    /// Timer path: OPEN → HALF_OPEN, only if still in the OPEN period `epoch` opened.
    pub(crate) fn recover(&self, epoch: u64) -> Option<Transition> {
        {
            let mut state = self.state.lock();
            if state.status != BreakerStatus::Open || state.open_epoch != epoch {
                tracing::debug!(route = %self.route, epoch, current_epoch = state.open_epoch, "Stale recovery timer ignored");
                return None;
            }
            state.status = BreakerStatus::HalfOpen;
            state.reset_half_open();
        }

        let transition = Transition { from: BreakerStatus::Open, to: BreakerStatus::HalfOpen };
        self.on_transition(transition);
        Some(transition)
    }

    fn on_transition(&self, transition: Transition) {
        match transition.to {
            BreakerStatus::Open => tracing::warn!(
                route = %self.route,
                from = %transition.from,
                open_timeout = ?self.settings.open_timeout,
                "Circuit opened"
            ),
            BreakerStatus::HalfOpen => tracing::info!(
                route = %self.route,
                max_trials = self.settings.max_half_open_trials,
                "Circuit half-open, admitting trial requests"
            ),
            BreakerStatus::Closed => tracing::info!(route = %self.route, "Circuit closed"),
        }
        metrics::record_breaker_transition(&self.route, transition);
    }
}
