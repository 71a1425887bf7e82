//! Per-request gating and outcome recording.
//!
//! # Responsibilities
//! - Resolve the route for a request
//! - Ask the route's breaker for permission
//! - Forward permitted requests and classify the result
//! - Record exactly one outcome per permitted request
//!
//! # Design Decisions
//! - Denied requests never reach the forwarder and never record an outcome
//! - 2xx is success; any other status, a transport error or a timeout is failure
//! - A request abandoned mid-forward (client gone, outer timeout) counts as a failure
//! - The breaker lock is only taken for the permission check and the record,
//!   never across the forwarded call

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::forward::{ForwardError, Forwarder};
use crate::http::request::RequestIdExt;
use crate::observability::metrics;
use crate::resilience::{Breaker, BreakerRegistry, RecoveryScheduler};
use crate::routing::Router;

/// Routes requests through their breakers to the backends.
#[derive(Debug)]
pub struct GatewayDispatcher {
    router: Router,
    breakers: BreakerRegistry,
    forwarder: Arc<dyn Forwarder>,
}

impl GatewayDispatcher {
    /// Every route in `router` must have a breaker in `breakers`.
    pub fn new(
        router: Router,
        breakers: BreakerRegistry,
        forwarder: Arc<dyn Forwarder>,
    ) -> Result<Self, GatewayError> {
        if let Some(missing) = router.ids().find(|id| breakers.get(id).is_none()) {
            return Err(GatewayError::InvalidConfig(format!("route {missing} has no breaker")));
        }
        Ok(Self {
            router,
            breakers,
            forwarder,
        })
    }

    /// Compile routes and create one breaker per route.
    pub fn from_config(
        config: &GatewayConfig,
        scheduler: Arc<dyn RecoveryScheduler>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Result<Self, GatewayError> {
        let router = Router::from_config(&config.routes)?;
        let breakers = BreakerRegistry::from_routes(router.ids(), &config.breaker.settings(), scheduler)?;
        Self::new(router, breakers, forwarder)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Handle one inbound request.
    pub async fn dispatch(&self, request: Request<Body>) -> Result<Response, GatewayError> {
        let start = Instant::now();
        let request_id = request.request_id().to_string();
        let path = request.uri().path().to_string();

        let Some(route) = self.router.match_path(&path) else {
            tracing::warn!(request_id = %request_id, path = %path, "No route matched");
            metrics::record_request("none", 404, start);
            return Err(GatewayError::RouteNotFound(path));
        };
        let breaker = self.breakers.lookup(route.id())?;
        let backend_uri = route.strip_uri(request.uri())?;

        if !breaker.allow_request() {
            tracing::debug!(request_id = %request_id, route = route.id(), "Circuit open, request rejected");
            metrics::record_breaker_rejection(route.id());
            metrics::record_request(route.id(), 503, start);
            return Err(GatewayError::CircuitOpen(route.id().to_string()));
        }

        // From here on the outcome is recorded even if this future is dropped.
        let outcome = OutcomeGuard::new(breaker, &request_id);
        let (mut parts, body) = request.into_parts();
        parts.uri = backend_uri;
        let result = self
            .forwarder
            .forward(route.backend(), Request::from_parts(parts, body))
            .await;

        let success = matches!(&result, Ok(response) if response.status().is_success());
        outcome.record(success);

        let result = result.map_err(|e| match e {
            ForwardError::Unreachable(reason) => GatewayError::BackendUnreachable {
                route: route.id().to_string(),
                reason,
            },
            ForwardError::Timeout(timeout) => GatewayError::BackendTimeout {
                route: route.id().to_string(),
                timeout,
            },
        });

        let status = match &result {
            Ok(response) => response.status(),
            Err(e) => e.status_code(),
        };
        let snapshot = breaker.snapshot();
        match &result {
            Ok(_) => tracing::info!(
                request_id = %request_id,
                route = route.id(),
                status = status.as_u16(),
                circuit = %snapshot.status,
                failure_rate = %format_failure_rate(snapshot.failure_rate()),
                "Request forwarded"
            ),
            Err(e) => tracing::error!(
                request_id = %request_id,
                route = route.id(),
                status = status.as_u16(),
                circuit = %snapshot.status,
                failure_rate = %format_failure_rate(snapshot.failure_rate()),
                error = %e,
                "Upstream error"
            ),
        }
        metrics::record_request(route.id(), status.as_u16(), start);

        result
    }
}

/// Records the outcome of one admitted request exactly once.
///
/// Dropped without `record` (client gone, outer timeout) it counts a failure.
struct OutcomeGuard<'a> {
    breaker: Option<&'a Arc<Breaker>>,
    request_id: &'a str,
}

impl<'a> OutcomeGuard<'a> {
    fn new(breaker: &'a Arc<Breaker>, request_id: &'a str) -> Self {
        Self {
            breaker: Some(breaker),
            request_id,
        }
    }

    fn record(mut self, success: bool) {
        if let Some(breaker) = self.breaker.take() {
            breaker.record_outcome(success);
        }
    }
}

impl Drop for OutcomeGuard<'_> {
    fn drop(&mut self) {
        if let Some(breaker) = self.breaker.take() {
            tracing::warn!(
                request_id = %self.request_id,
                route = breaker.route(),
                "Request abandoned before the backend answered, counted as failure"
            );
            breaker.record_outcome(false);
        }
    }
}

fn format_failure_rate(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{:.2}%", rate * 100.0),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;
    use crate::resilience::recovery::testing::ManualRecoveryScheduler;
    use crate::resilience::BreakerStatus;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use url::Url;

    /// Replies from a script; 200 once the script runs out.
    #[derive(Debug, Default)]
    struct ScriptedForwarder {
        script: Mutex<VecDeque<Result<StatusCode, ForwardError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedForwarder {
        fn push(&self, reply: Result<StatusCode, ForwardError>) {
            self.script.lock().push_back(reply);
        }

        fn calls(&self) -> usize {
            self.seen.lock().len()
        }
    }

    #[async_trait]
    impl Forwarder for ScriptedForwarder {
        async fn forward(&self, backend: &Url, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
            self.seen
                .lock()
                .push(format!("{}{}", backend.as_str().trim_end_matches('/'), request.uri()));
            let reply = self.script.lock().pop_front().unwrap_or(Ok(StatusCode::OK));
            reply.map(|status| {
                Response::builder()
                    .status(status)
                    .body(Body::from("backend"))
                    .unwrap()
            })
        }
    }

    struct Harness {
        dispatcher: GatewayDispatcher,
        forwarder: Arc<ScriptedForwarder>,
        scheduler: Arc<ManualRecoveryScheduler>,
    }

    fn harness(max_half_open_trials: u32) -> Harness {
        let mut config = GatewayConfig::default();
        config.routes = vec![
            RouteConfig::new("/svc1", "http://127.0.0.1:8090"),
            RouteConfig::new("/svc2", "http://127.0.0.1:8100"),
        ];
        config.breaker.max_half_open_trials = max_half_open_trials;

        let forwarder = Arc::new(ScriptedForwarder::default());
        let scheduler = Arc::new(ManualRecoveryScheduler::default());
        let dispatcher = GatewayDispatcher::from_config(&config, scheduler.clone(), forwarder.clone()).unwrap();
        Harness {
            dispatcher,
            forwarder,
            scheduler,
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    impl Harness {
        fn status(&self, route: &str) -> BreakerStatus {
            self.dispatcher.breakers().lookup(route).unwrap().status()
        }
    }

    #[tokio::test]
    async fn test_success_is_forwarded_and_recorded() {
        let h = harness(4);

        let response = h.dispatcher.dispatch(get("/svc1/orders?id=7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.forwarder.seen.lock().as_slice(), ["http://127.0.0.1:8090/orders?id=7"]);

        let snap = h.dispatcher.breakers().lookup("/svc1").unwrap().snapshot();
        assert_eq!(snap.request_count, 1);
        assert_eq!(snap.success_count, 1);
    }

    #[tokio::test]
    async fn test_server_error_opens_circuit() {
        let h = harness(4);
        h.forwarder.push(Ok(StatusCode::INTERNAL_SERVER_ERROR));

        let response = h.dispatcher.dispatch(get("/svc1/x")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(h.status("/svc1"), BreakerStatus::Open);
        assert_eq!(h.status("/svc2"), BreakerStatus::Closed);
        assert_eq!(h.scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn test_client_error_counts_as_failure() {
        let h = harness(4);
        h.forwarder.push(Ok(StatusCode::NOT_FOUND));

        h.dispatcher.dispatch(get("/svc1/missing")).await.unwrap();
        assert_eq!(h.status("/svc1"), BreakerStatus::Open);
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_without_forwarding() {
        let h = harness(4);
        h.forwarder.push(Ok(StatusCode::BAD_GATEWAY));
        h.dispatcher.dispatch(get("/svc1")).await.unwrap();
        let before = h.dispatcher.breakers().lookup("/svc1").unwrap().snapshot();

        for _ in 0..5 {
            let err = h.dispatcher.dispatch(get("/svc1/x")).await.unwrap_err();
            assert!(matches!(&err, GatewayError::CircuitOpen(route) if route == "/svc1"));
            assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        }

        assert_eq!(h.forwarder.calls(), 1);
        assert_eq!(h.dispatcher.breakers().lookup("/svc1").unwrap().snapshot(), before);

        let response = h.dispatcher.dispatch(get("/svc2/x")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unreachable_backend_opens_like_500() {
        let h = harness(4);
        h.forwarder.push(Err(ForwardError::Unreachable("connection refused".into())));

        let err = h.dispatcher.dispatch(get("/svc2/health")).await.unwrap_err();
        assert!(matches!(err, GatewayError::BackendUnreachable { ref route, .. } if route == "/svc2"));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(h.status("/svc2"), BreakerStatus::Open);

        let snap = h.dispatcher.breakers().lookup("/svc2").unwrap().snapshot();
        assert_eq!(snap.request_count, 1);
        assert_eq!(snap.success_count, 0);
    }

    #[tokio::test]
    async fn test_timeout_opens_circuit() {
        let h = harness(4);
        h.forwarder.push(Err(ForwardError::Timeout(Duration::from_secs(10))));

        let err = h.dispatcher.dispatch(get("/svc1")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(h.status("/svc1"), BreakerStatus::Open);
    }

    #[tokio::test]
    async fn test_unknown_route_touches_no_breaker() {
        let h = harness(4);

        let err = h.dispatcher.dispatch(get("/svc3/x")).await.unwrap_err();
        assert!(matches!(err, GatewayError::RouteNotFound(ref path) if path == "/svc3/x"));
        assert_eq!(h.forwarder.calls(), 0);
        for breaker in h.dispatcher.breakers().iter() {
            assert_eq!(breaker.snapshot().request_count, 0);
        }
    }

    #[tokio::test]
    async fn test_half_open_trials_close_circuit() {
        let h = harness(2);
        h.forwarder.push(Ok(StatusCode::SERVICE_UNAVAILABLE));
        h.dispatcher.dispatch(get("/svc1")).await.unwrap();
        assert_eq!(h.status("/svc1"), BreakerStatus::Open);

        h.scheduler.fire_all();
        assert_eq!(h.status("/svc1"), BreakerStatus::HalfOpen);

        h.dispatcher.dispatch(get("/svc1")).await.unwrap();
        assert_eq!(h.status("/svc1"), BreakerStatus::HalfOpen);
        h.dispatcher.dispatch(get("/svc1")).await.unwrap();
        assert_eq!(h.status("/svc1"), BreakerStatus::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failures_reopen_circuit() {
        let h = harness(2);
        h.forwarder.push(Ok(StatusCode::INTERNAL_SERVER_ERROR));
        h.dispatcher.dispatch(get("/svc1")).await.unwrap();
        h.scheduler.fire_all();

        h.forwarder.push(Err(ForwardError::Unreachable("reset".into())));
        h.forwarder.push(Ok(StatusCode::OK));
        let _ = h.dispatcher.dispatch(get("/svc1")).await;
        h.dispatcher.dispatch(get("/svc1")).await.unwrap();

        assert_eq!(h.status("/svc1"), BreakerStatus::Open);
        assert_eq!(h.scheduler.pending(), 1);
    }

    /// Backend that accepts the request and never answers.
    #[derive(Debug)]
    struct StalledForwarder;

    #[async_trait]
    impl Forwarder for StalledForwarder {
        async fn forward(&self, _backend: &Url, _request: Request<Body>) -> Result<Response<Body>, ForwardError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_abandoned_request_is_recorded_as_failure() {
        let mut config = GatewayConfig::default();
        config.routes = vec![RouteConfig::new("/svc1", "http://127.0.0.1:8090")];
        config.breaker.max_half_open_trials = 1;
        let scheduler = Arc::new(ManualRecoveryScheduler::default());
        let dispatcher = Arc::new(
            GatewayDispatcher::from_config(&config, scheduler.clone(), Arc::new(StalledForwarder)).unwrap(),
        );

        let breaker = dispatcher.breakers().lookup("/svc1").unwrap().clone();
        assert!(breaker.allow_request());
        breaker.record_outcome(false);
        scheduler.fire_all();
        assert_eq!(breaker.status(), BreakerStatus::HalfOpen);

        let in_flight = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch(get("/svc1/x")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(breaker.status(), BreakerStatus::HalfOpen);

        in_flight.abort();
        assert!(in_flight.await.unwrap_err().is_cancelled());

        // The single trial failed, so the circuit reopens.
        assert_eq!(breaker.status(), BreakerStatus::Open);
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn test_completed_request_is_recorded_once() {
        let h = harness(4);
        h.forwarder.push(Ok(StatusCode::OK));
        h.forwarder.push(Ok(StatusCode::CREATED));

        h.dispatcher.dispatch(get("/svc1/a")).await.unwrap();
        h.dispatcher.dispatch(get("/svc1/b")).await.unwrap();

        let snap = h.dispatcher.breakers().lookup("/svc1").unwrap().snapshot();
        assert_eq!(snap.request_count, 2);
        assert_eq!(snap.success_count, 2);
        assert_eq!(h.status("/svc1"), BreakerStatus::Closed);
    }

    #[test]
    fn test_format_failure_rate() {
        assert_eq!(format_failure_rate(None), "n/a");
        assert_eq!(format_failure_rate(Some(0.25)), "25.00%");
    }

    #[test]
    fn test_route_without_breaker_rejected() {
        let router = Router::from_config(&[RouteConfig::new("/svc1", "http://127.0.0.1:1")]).unwrap();
        let breakers = BreakerRegistry::from_routes(
            Vec::<String>::new(),
            &Default::default(),
            Arc::new(ManualRecoveryScheduler::default()),
        )
        .unwrap();
        let err = GatewayDispatcher::new(router, breakers, Arc::new(ScriptedForwarder::default())).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidConfig(_)));
    }
}
