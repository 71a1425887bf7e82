use axum::{extract::State, Json};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::http::server::AppState;
use crate::resilience::{BreakerRegistry, BreakerStatus};

/// One route's entry in `/breaker-status`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerReport {
    pub status: BreakerStatus,
    /// Percentage rounded to two decimals; `null` before any outcome was recorded.
    pub failure_rate: Option<f64>,
    pub request_count: u64,
    pub success_count: u64,
}

/// Route → breaker report, serialized as a JSON object in route configuration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BreakerStatusReport(pub Vec<(String, BreakerReport)>);

impl BreakerStatusReport {
    pub fn collect(breakers: &BreakerRegistry) -> Self {
        let entries = breakers
            .iter()
            .map(|breaker| {
                let snapshot = breaker.snapshot();
                let report = BreakerReport {
                    status: snapshot.status,
                    failure_rate: snapshot.failure_rate().map(as_percentage),
                    request_count: snapshot.request_count,
                    success_count: snapshot.success_count,
                };
                (breaker.route().to_string(), report)
            })
            .collect();
        Self(entries)
    }
}

impl Serialize for BreakerStatusReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (route, report) in &self.0 {
            map.serialize_entry(route, report)?;
        }
        map.end()
    }
}

fn as_percentage(rate: f64) -> f64 {
    (rate * 100.0 * 100.0).round() / 100.0
}

pub async fn get_health() -> &'static str {
    "API Gateway is healthy\n"
}

pub async fn get_breaker_status(State(state): State<AppState>) -> Json<BreakerStatusReport> {
    Json(BreakerStatusReport::collect(state.dispatcher.breakers()))
}
