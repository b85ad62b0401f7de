//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse top level, decode each service on its own)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to the reload controller
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → reload controller drains the old listener and starts a new one
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All top-level fields have defaults to allow minimal configs
//! - A malformed service is skipped, never fatal

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_initial_config, parse_config, ConfigError};
pub use schema::{
    Compression, GatewayConfig, HttpsConfig, ObservabilityConfig, RateLimitConfig,
    ServiceDefinition, ServiceMode,
};
