//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with gateway endpoints and the proxy catch-all
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener
//! - Hand every proxied request to the dispatcher

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::dispatcher::GatewayDispatcher;
use crate::http::forward::HyperForwarder;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::Shutdown;
use crate::resilience::TokioRecoveryScheduler;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<GatewayDispatcher>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    dispatcher: Arc<GatewayDispatcher>,
}

impl HttpServer {
    /// Build routes, breakers and the backend client from configuration.
    ///
    /// Recovery timers stop when `shutdown` triggers.
    pub fn new(config: GatewayConfig, shutdown: &Shutdown) -> Result<Self, GatewayError> {
        let scheduler = TokioRecoveryScheduler::shared(shutdown.clone());
        let forwarder = Arc::new(HyperForwarder::new(Duration::from_millis(
            config.timeouts.backend_ms,
        )));
        let dispatcher = GatewayDispatcher::from_config(&config, scheduler, forwarder)?;
        Ok(Self::with_dispatcher(config, Arc::new(dispatcher)))
    }

    /// Serve an already-built dispatcher.
    pub fn with_dispatcher(config: GatewayConfig, dispatcher: Arc<GatewayDispatcher>) -> Self {
        let state = AppState {
            dispatcher: dispatcher.clone(),
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            dispatcher,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        setup_admin_router()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// The router, for serving it some other way (or driving it in tests).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        for route in self.dispatcher.router().routes() {
            tracing::info!(route = route.id(), backend = %route.backend(), "Route registered");
        }
        tracing::info!(
            address = %addr,
            routes = self.dispatcher.breakers().len(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<GatewayDispatcher> {
        &self.dispatcher
    }
}

/// Catch-all handler: everything not served by the gateway itself.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    match state.dispatcher.dispatch(request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
