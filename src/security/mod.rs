//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → access_control.rs (deny list, then allow list)
//!     → rate_limit.rs (per-source token bucket)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Decisions use the socket peer address only, never forwarding headers
//! - Fail closed: a refused request never reaches a service handler
//! - Refusals are rendered error documents, not bare strings

pub mod access_control;
pub mod rate_limit;

use std::net::{IpAddr, SocketAddr};

pub use access_control::AccessList;
pub use rate_limit::{RateLimiter, RefillTask};

/// Source address of a connection with the port stripped.
///
/// IPv4-mapped IPv6 addresses are reported as plain IPv4.
pub fn source_ip(addr: &SocketAddr) -> IpAddr {
    addr.ip().to_canonical()
}
