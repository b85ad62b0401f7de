//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup / reload (reload.rs):
//!     GatewayConfig → compile route table → bind → Running
//!     config update → prepare → drain old listener → bind new → Running
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - One listener at a time; the old one is drained before the new one binds
//! - Shutdown has a deadline: connections still open after it are closed
//! - A failed reload never takes down a working listener before it must

pub mod reload;
pub mod shutdown;
pub mod signals;

pub use reload::{ControllerState, ControllerStatus, ReloadController, StartError};
pub use shutdown::Shutdown;
