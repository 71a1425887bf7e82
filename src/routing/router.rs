//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the route for a request path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) path prefix scan (acceptable for typical route counts)
//! - Longest matching prefix wins, so resolution never depends on config order
//! - Explicit NoMatch rather than silent default

use axum::http::Uri;
use url::Url;

use crate::config::RouteConfig;
use crate::error::GatewayError;
use crate::routing::matcher::{Matcher, PathPrefixMatcher};

/// A compiled route: prefix matcher plus backend base URL.
#[derive(Debug, Clone)]
pub struct Route {
    matcher: PathPrefixMatcher,
    backend: Url,
}

impl Route {
    /// Route identifier (its path prefix).
    pub fn id(&self) -> &str {
        self.matcher.prefix()
    }

    pub fn backend(&self) -> &Url {
        &self.backend
    }

    /// Origin-form URI for the backend: prefix stripped, query kept.
    pub fn strip_uri(&self, uri: &Uri) -> Result<Uri, GatewayError> {
        let path = self.matcher.strip(uri.path());
        let path_and_query = match uri.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };
        path_and_query
            .parse()
            .map_err(|e| GatewayError::InvalidRequest(format!("cannot rewrite {uri}: {e}")))
    }
}

/// Immutable route table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Compile routes from configuration.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, GatewayError> {
        let mut routes = Vec::with_capacity(configs.len());
        for config in configs {
            let backend = Url::parse(&config.backend).map_err(|e| {
                GatewayError::InvalidConfig(format!(
                    "backend {:?} for route {:?}: {e}",
                    config.backend, config.prefix
                ))
            })?;
            routes.push(Route {
                matcher: PathPrefixMatcher::new(config.prefix.clone()),
                backend,
            });
        }
        Ok(Self { routes })
    }

    /// Find the route with the longest prefix matching `path`.
    pub fn match_path(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|route| route.matcher.matches(path))
            .max_by_key(|route| route.id().len())
    }

    /// Routes in configuration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Route identifiers in configuration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(Route::id)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
