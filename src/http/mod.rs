//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (net::listener)
//!     → server.rs (Axum router, middleware chain)
//!     → request.rs (request ID)
//!     → debug.rs (development endpoints) or route table dispatch
//!     → response.rs (rendered error documents)
//!     → Send to client
//! ```

pub mod debug;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::error_response;
pub use server::{Gateway, GatewayState};
