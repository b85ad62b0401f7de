//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation of top-level fields (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, refill interval > 0)
//! - Check that the bind address and access list entries parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Per-service problems are not validation errors; they skip one service

use std::net::IpAddr;
use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("hostAddress '{0}' is not an IP address")]
    InvalidHostAddress(String),
    #[error("shutdownTimeoutSecs must be greater than zero")]
    ZeroShutdownTimeout,
    #[error("rate_limiting.refill_interval_ms must be greater than zero")]
    ZeroRefillInterval,
    #[error("{list} entry '{entry}' is not an IP address")]
    InvalidAccessEntry { list: &'static str, entry: String },
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.host_address.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::InvalidHostAddress(config.host_address.clone()));
    }

    if config.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::ZeroShutdownTimeout);
    }

    if let Some(rate_limiting) = &config.rate_limiting {
        if rate_limiting.refill_interval_ms == 0 {
            errors.push(ValidationError::ZeroRefillInterval);
        }
    }

    for (list, entries) in [("whitelist", &config.whitelist), ("blacklist", &config.blacklist)] {
        for entry in entries {
            if entry.trim().parse::<IpAddr>().is_err() {
                errors.push(ValidationError::InvalidAccessEntry {
                    list,
                    entry: entry.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
