//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured address
//!     → listener.rs (bind, serve router, drain)
//!     → tls.rs (optional PEM material, selects the TLS acceptor)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional and selected by the presence of `[https]`
//! - Missing key material fails the start attempt, never the process

pub mod listener;
pub mod tls;

pub use listener::{bind, ListenerError, RunningListener};
pub use tls::{load_https, load_tls_config};
