//! Route table lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes for one configuration generation
//! - Look up the most specific route for a request path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Longest prefix wins, so insertion order does not matter
//! - O(n) prefix scan (acceptable for typical route counts)

use axum::{body::Body, http::Request, response::Response};
use serde::Serialize;
use std::convert::Infallible;
use tower::util::BoxCloneSyncService;

use crate::config::ServiceMode;
use crate::routing::matcher::PathPrefixMatcher;

/// A compiled service handler.
pub type ServiceHandler = BoxCloneSyncService<Request<Body>, Response, Infallible>;

/// One compiled service: a route prefix and the handler behind it.
#[derive(Clone)]
pub struct CompiledRoute {
    pub name: String,
    pub mode: ServiceMode,
    pub matcher: PathPrefixMatcher,
    pub handler: ServiceHandler,
}

impl CompiledRoute {
    pub fn route(&self) -> &str {
        self.matcher.prefix()
    }

    pub fn summary(&self) -> ServiceSummary {
        ServiceSummary {
            name: self.name.clone(),
            mode: self.mode,
            route: self.route().to_string(),
        }
    }
}

impl std::fmt::Debug for CompiledRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRoute")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("route", &self.route())
            .finish_non_exhaustive()
    }
}

/// Name, mode and route of a loaded service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    pub mode: ServiceMode,
    pub route: String,
}

/// Immutable set of compiled routes for one configuration generation.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Build a table from compiled routes.
    ///
    /// Callers must not pass two routes with the same prefix; the builder in
    /// `compiler.rs` refuses duplicates before they get here.
    pub fn new(mut routes: Vec<CompiledRoute>) -> Self {
        routes.sort_by(|a, b| {
            b.route()
                .len()
                .cmp(&a.route().len())
                .then_with(|| a.route().cmp(b.route()))
        });
        Self { routes }
    }

    /// The most specific route whose prefix covers `path`.
    pub fn match_path(&self, path: &str) -> Option<&CompiledRoute> {
        self.routes.iter().find(|route| route.matcher.matches(path))
    }

    /// Services in the table, ordered by name.
    pub fn summaries(&self) -> Vec<ServiceSummary> {
        let mut summaries: Vec<_> = self.routes.iter().map(CompiledRoute::summary).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
