//! Per-route breaker ownership.
//!
//! Built once at startup from the route table; the key set never changes
//! afterwards, so lookups need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::resilience::circuit_breaker::{Breaker, BreakerSettings};
use crate::resilience::recovery::RecoveryScheduler;

/// One breaker per route, iterated in configuration order.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: Vec<Arc<Breaker>>,
    index: HashMap<String, usize>,
}

impl BreakerRegistry {
    /// Create a breaker for every route with the same settings.
    pub fn from_routes<I, S>(
        routes: I,
        settings: &BreakerSettings,
        scheduler: Arc<dyn RecoveryScheduler>,
    ) -> Result<Self, GatewayError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut breakers = Vec::new();
        let mut index = HashMap::new();

        for route in routes {
            let route = route.into();
            if index.contains_key(&route) {
                return Err(GatewayError::InvalidConfig(format!("duplicate route {route}")));
            }
            let breaker = Breaker::new(route.clone(), settings.clone(), scheduler.clone())?;
            index.insert(route, breakers.len());
            breakers.push(breaker);
        }

        tracing::debug!(
            count = breakers.len(),
            failure_threshold = settings.failure_threshold,
            open_timeout = ?settings.open_timeout,
            max_half_open_trials = settings.max_half_open_trials,
            "Breakers created"
        );

        Ok(Self { breakers, index })
    }

    pub fn get(&self, route: &str) -> Option<&Arc<Breaker>> {
        self.index.get(route).map(|&i| &self.breakers[i])
    }

    pub fn lookup(&self, route: &str) -> Result<&Arc<Breaker>, GatewayError> {
        self.get(route)
            .ok_or_else(|| GatewayError::RouteNotFound(route.to_string()))
    }

    /// Breakers in the order their routes were configured.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Breaker>> {
        self.breakers.iter()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
