//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (per configuration generation):
//!     services table
//!     → compiler.rs (definition → handler, one log line per service)
//!     → matcher.rs (normalize route prefixes)
//!     → router.rs (freeze as immutable RouteTable)
//!
//! Incoming Request (path)
//!     → router.rs (longest matching prefix)
//!     → Return: matched CompiledRoute or NoMatch
//! ```
//!
//! # Design Decisions
//! - Routes compiled at load time, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - Most specific prefix wins

pub mod compiler;
pub mod matcher;
pub mod router;

pub use compiler::{compile_route_table, compile_service, CompileContext, CompileError};
pub use matcher::{normalize_route, PathPrefixMatcher, RouteError};
pub use router::{CompiledRoute, RouteTable, ServiceHandler, ServiceSummary};
