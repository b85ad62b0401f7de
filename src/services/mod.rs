//! Service handlers.
//!
//! # Data Flow
//! ```text
//! RouteTable match
//!     → proxy.rs        (rewrite, forward, intercept upstream errors)
//!     → static_files.rs (files, index.html, directory listing)
//!     → bridge.rs       (one interpreter process per request)
//!     → Response
//! ```
//!
//! Handlers never fail at the service level: every problem a request can
//! hit becomes a rendered error document.

pub mod bridge;
pub mod proxy;
pub mod static_files;

pub use bridge::{Bridge, BridgeError};
pub use proxy::{build_client, ProxyClient, ProxyTarget, ReverseProxy, TargetError};
pub use static_files::StaticFiles;
