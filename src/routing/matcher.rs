//! Route prefix matching.
//!
//! # Responsibilities
//! - Normalize configured route prefixes
//! - Match request paths against a prefix on segment boundaries
//! - Strip the matched prefix for handlers that need the remainder
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - `/api` matches `/api` and `/api/...` but not `/apiary`
//! - No regex to guarantee O(n) matching

use thiserror::Error;

/// Why a configured route was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route is empty")]
    Empty,
    #[error("route '{0}' must start with '/'")]
    NotAbsolute(String),
    #[error("route '{0}' contains a reserved character ('{{', '}}' or '*')")]
    ReservedCharacter(String),
}

/// Validate a configured route and strip any trailing slash.
pub fn normalize_route(route: &str) -> Result<String, RouteError> {
    let route = route.trim();
    if route.is_empty() {
        return Err(RouteError::Empty);
    }
    if !route.starts_with('/') {
        return Err(RouteError::NotAbsolute(route.to_string()));
    }
    if route.contains(|c| matches!(c, '{' | '}' | '*')) {
        return Err(RouteError::ReservedCharacter(route.to_string()));
    }

    let trimmed = route.trim_end_matches('/');
    if trimmed.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a matcher for an already normalized prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns true if `path` is the prefix or lies beneath it.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// The part of `path` after the prefix, always starting with `/`.
    pub fn strip<'a>(&self, path: &'a str) -> &'a str {
        if self.prefix == "/" {
            return path;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some("") => "/",
            Some(rest) => rest,
            None => path,
        }
    }
}
