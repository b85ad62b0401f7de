//! Gatehouse: a configurable application gateway.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod services;
pub mod templates;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::Gateway;
pub use lifecycle::{ReloadController, Shutdown};
