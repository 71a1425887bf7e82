//! Recovery timers moving OPEN breakers to HALF_OPEN.
//!
//! # Responsibilities
//! - Wait `open_timeout` after a breaker opens, off the request path
//! - Fire the OPEN → HALF_OPEN transition through the breaker's own lock
//! - Stop quietly when the breaker is gone or the process shuts down,
//!   and start no new timer once shutdown has been triggered
//!
//! # Design Decisions
//! - Timers are never cancelled by the breaker; a ticket that no longer
//!   matches the breaker's OPEN period is a no-op when it fires
//! - Tickets hold a `Weak` reference so a pending timer does not keep a breaker alive

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;

use crate::lifecycle::Shutdown;
use crate::resilience::circuit_breaker::{Breaker, Transition};

/// Something that runs a ticket after a delay.
pub trait RecoveryScheduler: Send + Sync + fmt::Debug {
    fn schedule(&self, ticket: RecoveryTicket, delay: Duration);
}

/// One pending OPEN → HALF_OPEN transition.
#[derive(Debug, Clone)]
pub struct RecoveryTicket {
    breaker: Weak<Breaker>,
    epoch: u64,
}

impl RecoveryTicket {
    pub(crate) fn new(breaker: Weak<Breaker>, epoch: u64) -> Self {
        Self { breaker, epoch }
    }

    /// The OPEN period this ticket was issued for.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Apply the transition if the breaker still exists and is still in the same OPEN period.
    pub fn fire(self) -> Option<Transition> {
        let breaker = self.breaker.upgrade()?;
        breaker.recover(self.epoch)
    }
}

/// Spawns one tokio task per OPEN period.
#[derive(Debug, Clone)]
pub struct TokioRecoveryScheduler {
    shutdown: Shutdown,
}

impl TokioRecoveryScheduler {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }

    pub fn shared(shutdown: Shutdown) -> Arc<dyn RecoveryScheduler> {
        Arc::new(Self::new(shutdown))
    }
}

impl RecoveryScheduler for TokioRecoveryScheduler {
    fn schedule(&self, ticket: RecoveryTicket, delay: Duration) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, epoch = ticket.epoch, "No runtime for recovery timer, circuit stays open");
                return;
            }
        };

        // Subscribe before checking the flag so a concurrent trigger is not missed.
        let mut shutdown = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            tracing::debug!(epoch = ticket.epoch, "Shutting down, recovery timer not started");
            return;
        }
        handle.spawn(async move {
            let epoch = ticket.epoch;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if ticket.fire().is_none() {
                        tracing::trace!(epoch, "Recovery timer fired without effect");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!(epoch, "Recovery timer cancelled by shutdown");
                }
            }
        });
    }
}
