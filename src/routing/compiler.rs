//! Service compilation.
//!
//! Turns each `ServiceDefinition` into a `CompiledRoute`. A definition that
//! cannot be compiled is left out of the table; the others are unaffected.
//! Every service produces exactly one log line naming its outcome.

use axum::{body::Body, http::Request};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::PathBuf;
use thiserror::Error;
use tower::util::BoxCloneSyncService;
use tower::{service_fn, Layer, ServiceExt};
use tower_http::compression::CompressionLayer;

use crate::config::{Compression, ServiceDefinition, ServiceMode};
use crate::observability::metrics;
use crate::routing::matcher::{normalize_route, PathPrefixMatcher, RouteError};
use crate::routing::router::{CompiledRoute, RouteTable};
use crate::services::bridge::{default_interpreter, probe_interpreter, Bridge, BridgeError};
use crate::services::proxy::{build_client, ProxyClient, ProxyTarget, ReverseProxy, TargetError};
use crate::services::static_files::StaticFiles;

/// Why one service was left out of the route table.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid route: {0}")]
    InvalidRoute(#[from] RouteError),

    #[error("route '{route}' is already served by '{existing}'")]
    DuplicateRoute { route: String, existing: String },

    #[error("invalid target: {0}")]
    InvalidTarget(#[from] TargetError),

    #[error("cannot resolve directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl CompileError {
    /// Error class shown in logs: definition problems are configuration
    /// errors, failures to resolve what a definition names are compile errors.
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::MissingField(_)
            | CompileError::InvalidRoute(_)
            | CompileError::DuplicateRoute { .. } => "ConfigurationError",
            _ => "CompileError",
        }
    }
}

/// Inputs shared by every service of one generation.
#[derive(Clone)]
pub struct CompileContext {
    /// Whether the listener terminates TLS.
    pub secure: bool,
    pub client: ProxyClient,
}

impl CompileContext {
    pub fn new(secure: bool) -> Self {
        Self {
            secure,
            client: build_client(),
        }
    }
}

/// Compile one definition into a route.
pub async fn compile_service(
    name: &str,
    definition: &ServiceDefinition,
    ctx: &CompileContext,
) -> Result<CompiledRoute, CompileError> {
    let route = normalize_route(&definition.route)?;
    let matcher = PathPrefixMatcher::new(route);

    let handler = match definition.mode {
        ServiceMode::ReverseProxy => {
            let target = definition
                .target
                .as_deref()
                .ok_or(CompileError::MissingField("target"))?;
            let target = ProxyTarget::parse(target)?;
            let proxy = ReverseProxy::new(
                name,
                target,
                definition.forward_errors,
                ctx.secure,
                ctx.client.clone(),
            );
            BoxCloneSyncService::new(service_fn(move |req: Request<Body>| {
                let proxy = proxy.clone();
                async move { Ok::<_, Infallible>(proxy.forward(req).await) }
            }))
        }
        ServiceMode::StaticFiles => {
            let directory = definition
                .directory
                .as_ref()
                .ok_or(CompileError::MissingField("directory"))?;
            let root = tokio::fs::canonicalize(directory)
                .await
                .map_err(|source| CompileError::Directory {
                    path: directory.clone(),
                    source,
                })?;
            if !root.is_dir() {
                return Err(CompileError::NotADirectory(root));
            }

            let files = StaticFiles::new(
                name,
                matcher.clone(),
                root,
                definition.show_directory_browser,
            );
            let service = service_fn(move |req: Request<Body>| {
                let files = files.clone();
                async move { Ok::<_, Infallible>(files.serve(req).await) }
            });
            match compression_layer(definition.compression) {
                Some(layer) => BoxCloneSyncService::new(
                    layer.layer(service).map_response(|res| res.map(Body::new)),
                ),
                None => BoxCloneSyncService::new(service),
            }
        }
        ServiceMode::Bridge => {
            let module = definition
                .module
                .as_deref()
                .ok_or(CompileError::MissingField("module"))?;
            let interpreter = definition
                .interpreter
                .as_deref()
                .unwrap_or(default_interpreter());
            probe_interpreter(interpreter).await?;

            let bridge = Bridge::new(name, interpreter, module);
            BoxCloneSyncService::new(service_fn(move |req: Request<Body>| {
                let bridge = bridge.clone();
                async move { Ok::<_, Infallible>(bridge.serve(req).await) }
            }))
        }
    };

    Ok(CompiledRoute {
        name: name.to_string(),
        mode: definition.mode,
        matcher,
        handler,
    })
}

/// Layer negotiating exactly the configured encoding.
fn compression_layer(compression: Compression) -> Option<CompressionLayer> {
    let none = CompressionLayer::new().no_gzip().no_deflate().no_br().no_zstd();
    match compression {
        Compression::None => None,
        Compression::Gzip => Some(none.gzip(true)),
        Compression::Deflate => Some(none.deflate(true)),
        Compression::Br => Some(none.br(true)),
        Compression::Zstd => Some(none.zstd(true)),
    }
}

/// Compile every service into a new route table.
///
/// Services are compiled in name order; when two normalize to the same
/// route, the later one is skipped.
pub async fn compile_route_table(
    services: &BTreeMap<String, ServiceDefinition>,
    ctx: &CompileContext,
) -> RouteTable {
    let mut routes: Vec<CompiledRoute> = Vec::with_capacity(services.len());

    for (name, definition) in services {
        let result = compile_service(name, definition, ctx).await.and_then(|compiled| {
            match routes.iter().find(|r| r.route() == compiled.route()) {
                Some(existing) => Err(CompileError::DuplicateRoute {
                    route: compiled.route().to_string(),
                    existing: existing.name.clone(),
                }),
                None => Ok(compiled),
            }
        });

        match result {
            Ok(compiled) => {
                tracing::info!(
                    service = %name,
                    mode = %definition.mode,
                    route = %compiled.route(),
                    "Service loaded"
                );
                routes.push(compiled);
            }
            Err(e) => {
                tracing::error!(
                    service = %name,
                    mode = %definition.mode,
                    route = %definition.route,
                    error = %e,
                    "{}: service skipped",
                    e.kind()
                );
            }
        }
    }

    metrics::record_services_loaded(routes.len());
    RouteTable::new(routes)
}
