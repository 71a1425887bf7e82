//! Backend forwarding.
//!
//! # Responsibilities
//! - Send an already-routed request to a backend base URL
//! - Report transport failures and deadline misses as typed errors
//!
//! # Design Decisions
//! - `Forwarder` is the seam between the dispatcher and the network; tests plug in fakes
//! - No retries: each call reaches the backend at most once
//! - The deadline covers connect + response head, not body streaming

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, Uri, Version};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use url::Url;

use crate::http::response::strip_hop_by_hop;
use crate::resilience::timeouts::{with_deadline, DeadlineExceeded};

/// Why a forwarded call produced no backend response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend timed out after {0:?}")]
    Timeout(Duration),
}

/// Sends requests to backends.
///
/// `request` carries an origin-form URI (path and query only, route prefix removed).
#[async_trait]
pub trait Forwarder: Send + Sync + fmt::Debug {
    async fn forward(&self, backend: &Url, request: Request<Body>) -> Result<Response<Body>, ForwardError>;
}

/// Forwarder on the hyper-util pooled client.
#[derive(Debug, Clone)]
pub struct HyperForwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HyperForwarder {
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client, timeout }
    }

    /// Join the backend base URL with the request's path and query.
    fn target_uri(backend: &Url, uri: &Uri) -> Result<Uri, ForwardError> {
        let base = backend.as_str().trim_end_matches('/');
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{base}{path_and_query}")
            .parse()
            .map_err(|e| ForwardError::Unreachable(format!("invalid backend URI: {e}")))
    }
}

#[async_trait]
impl Forwarder for HyperForwarder {
    async fn forward(&self, backend: &Url, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = Self::target_uri(backend, &parts.uri)?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        // The client derives Host from the backend URI.
        parts.headers.remove(header::HOST);

        let request = Request::from_parts(parts, body);
        match with_deadline(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(into_gateway_response(response)),
            Ok(Err(e)) => Err(ForwardError::Unreachable(e.to_string())),
            Err(DeadlineExceeded(timeout)) => Err(ForwardError::Timeout(timeout)),
        }
    }
}

/// Re-box a backend response for the client, dropping connection-level headers.
fn into_gateway_response(response: Response<Incoming>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}
