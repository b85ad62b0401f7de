//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.
//! Service definitions are decoded one at a time by the loader so that a
//! malformed entry only removes itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    #[serde(rename = "hostAddress", alias = "hostaddress")]
    pub host_address: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Enables the `/debug` endpoints.
    #[serde(rename = "developmentMode", alias = "developmentmode")]
    pub development_mode: bool,

    /// Deadline for draining in-flight requests on reload or shutdown.
    #[serde(rename = "shutdownTimeoutSecs", alias = "shutdowntimeoutsecs")]
    pub shutdown_timeout_secs: u64,

    /// Optional TLS material. Presence selects a TLS listener.
    pub https: Option<HttpsConfig>,

    /// Source addresses allowed to connect. Empty allows everyone.
    pub whitelist: Vec<String>,

    /// Source addresses refused outright. Empty refuses nobody.
    pub blacklist: Vec<String>,

    /// Per-source rate limiting. Absent disables the limiter.
    pub rate_limiting: Option<RateLimitConfig>,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Named service definitions, decoded individually by the loader.
    #[serde(skip)]
    pub services: BTreeMap<String, ServiceDefinition>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host_address: "0.0.0.0".to_string(),
            port: 80,
            development_mode: true,
            shutdown_timeout_secs: 5,
            https: None,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            rate_limiting: None,
            observability: ObservabilityConfig::default(),
            services: BTreeMap::new(),
        }
    }
}

impl GatewayConfig {
    /// Socket address the listener binds to.
    pub fn bind_address(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        let ip: IpAddr = self.host_address.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// TLS certificate and key locations (PEM).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpsConfig {
    /// Path to certificate chain file.
    pub certificate_file: Option<PathBuf>,

    /// Path to private key file.
    pub key_file: Option<PathBuf>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Bucket size handed to a source address on its first request.
    pub max_requests: u32,

    /// Interval between refill ticks in milliseconds.
    #[serde(default = "default_refill_interval_ms")]
    pub refill_interval_ms: u64,
}

fn default_refill_interval_ms() -> u64 {
    1000
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,

    /// Prometheus exporter bind address. Absent disables the exporter.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}

/// How a service handles requests under its route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceMode {
    ReverseProxy,
    StaticFiles,
    Bridge,
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceMode::ReverseProxy => "reverseProxy",
            ServiceMode::StaticFiles => "staticFiles",
            ServiceMode::Bridge => "bridge",
        };
        f.write_str(name)
    }
}

/// Content encoding applied to static file bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    #[serde(alias = "")]
    None,
    Gzip,
    Deflate,
    Br,
    Zstd,
}

/// One named entry of the `services` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceDefinition {
    /// Handler kind.
    pub mode: ServiceMode,

    /// URL path prefix served by this service.
    pub route: String,

    /// Upstream origin for `reverseProxy`.
    #[serde(default)]
    pub target: Option<String>,

    /// Pass upstream error bodies through instead of rendering our own.
    #[serde(default, rename = "forwardErrors", alias = "forwarderrors")]
    pub forward_errors: bool,

    /// Root directory for `staticFiles`.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Render a listing for directories without an `index.html`.
    #[serde(
        default = "default_show_directory_browser",
        rename = "showDirectoryBrowser",
        alias = "showdirectorybrowser"
    )]
    pub show_directory_browser: bool,

    /// Encoding for static responses.
    #[serde(default)]
    pub compression: Compression,

    /// Application module for `bridge`.
    #[serde(default)]
    pub module: Option<String>,

    /// Interpreter executable for `bridge`.
    #[serde(default)]
    pub interpreter: Option<String>,
}

fn default_show_directory_browser() -> bool {
    true
}

impl ServiceDefinition {
    fn bare(mode: ServiceMode, route: impl Into<String>) -> Self {
        Self {
            mode,
            route: route.into(),
            target: None,
            forward_errors: false,
            directory: None,
            show_directory_browser: true,
            compression: Compression::None,
            module: None,
            interpreter: None,
        }
    }

    /// A `reverseProxy` definition forwarding `route` to `target`.
    pub fn reverse_proxy(route: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::bare(ServiceMode::ReverseProxy, route)
        }
    }

    /// A `staticFiles` definition serving `directory` under `route`.
    pub fn static_files(route: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
            ..Self::bare(ServiceMode::StaticFiles, route)
        }
    }

    /// A `bridge` definition running `module` under `route`.
    pub fn bridge(route: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            ..Self::bare(ServiceMode::Bridge, route)
        }
    }
}
