//! Allow-list and deny-list enforcement.
//!
//! Both checks look only at the connection's source address with the port
//! stripped. The deny check runs first; an address on the deny list is
//! refused whatever the allow list says.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::http::response::error_response;
use crate::observability::metrics;
use crate::security::source_ip;

/// Read-only snapshot of the configured address lists.
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    allow: HashSet<IpAddr>,
    deny: HashSet<IpAddr>,
    /// Set when the configured allow list had entries, parseable or not.
    restricted: bool,
}

impl AccessList {
    /// Build the lists from configured address strings.
    ///
    /// Entries that are not IP addresses match no source and are logged.
    /// An allow list made only of such entries still restricts access, so
    /// it refuses everyone.
    pub fn new(whitelist: &[String], blacklist: &[String]) -> Self {
        Self {
            allow: parse_entries("whitelist", whitelist),
            deny: parse_entries("blacklist", blacklist),
            restricted: whitelist.iter().any(|entry| !entry.trim().is_empty()),
        }
    }

    /// True when the address is on a non-empty deny list.
    pub fn is_denied(&self, ip: IpAddr) -> bool {
        !self.deny.is_empty() && self.deny.contains(&ip.to_canonical())
    }

    /// True when no allow list is configured or it contains the address.
    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        !self.restricted || self.allow.contains(&ip.to_canonical())
    }

    /// Combined decision, deny first.
    pub fn permits(&self, ip: IpAddr) -> bool {
        !self.is_denied(ip) && self.is_allowed(ip)
    }

    pub fn has_allow_list(&self) -> bool {
        self.restricted
    }

    pub fn has_deny_list(&self) -> bool {
        !self.deny.is_empty()
    }
}

fn parse_entries(list: &'static str, entries: &[String]) -> HashSet<IpAddr> {
    entries
        .iter()
        .filter_map(|entry| match entry.trim().parse::<IpAddr>() {
            Ok(ip) => Some(ip.to_canonical()),
            Err(_) => {
                tracing::warn!(list, entry = %entry, "Access list entry is not an IP address and matches no source");
                None
            }
        })
        .collect()
}

/// Reject sources on the deny list with 403.
pub async fn deny_list_middleware(
    State(access): State<Arc<AccessList>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = source_ip(&addr);
    if access.is_denied(ip) {
        tracing::warn!(client = %ip, path = %request.uri().path(), "Source address is blacklisted");
        metrics::record_access_denied("blacklist");
        return error_response(StatusCode::FORBIDDEN, None);
    }
    next.run(request).await
}

/// Reject sources missing from a non-empty allow list with 403.
pub async fn allow_list_middleware(
    State(access): State<Arc<AccessList>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = source_ip(&addr);
    if !access.is_allowed(ip) {
        tracing::warn!(client = %ip, path = %request.uri().path(), "Source address is not whitelisted");
        metrics::record_access_denied("whitelist");
        return error_response(StatusCode::FORBIDDEN, None);
    }
    next.run(request).await
}
