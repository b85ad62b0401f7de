//! Gateway router composition.
//!
//! # Responsibilities
//! - Create the Axum Router for one configuration generation
//! - Mount the development-only debug endpoints
//! - Wire up middleware (request ID, access control, rate limit, tracing, panic recovery)
//! - Dispatch every other request through the route table
//!
//! # Middleware order (outermost first)
//! ```text
//! request id → deny list → allow list → rate limit → trace → catch panic → dispatch
//! ```

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::Response,
    routing::get,
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::http::debug;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::http::response::error_response;
use crate::observability::{metrics, LogBuffer};
use crate::routing::RouteTable;
use crate::security::access_control::{allow_list_middleware, deny_list_middleware};
use crate::security::rate_limit::rate_limit_middleware;
use crate::security::{AccessList, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub table: Arc<RouteTable>,
    pub generation: u64,
    pub logs: LogBuffer,
}

/// Everything one generation of the gateway is built from.
pub struct Gateway {
    pub table: RouteTable,
    pub generation: u64,
    pub development_mode: bool,
    pub access: Arc<AccessList>,
    /// Absent when rate limiting is not configured.
    pub limiter: Option<Arc<RateLimiter>>,
    pub logs: LogBuffer,
}

impl Gateway {
    /// Build the Axum router with all middleware layers.
    pub fn into_router(self) -> Router {
        let state = GatewayState {
            table: Arc::new(self.table),
            generation: self.generation,
            logs: self.logs,
        };

        let mut router = Router::new();
        if self.development_mode {
            router = router
                .route("/debug", get(debug::debug_info))
                .route("/debug/log", get(debug::debug_log));
        }

        let mut router = router
            .fallback(dispatch)
            .method_not_allowed_fallback(method_not_allowed)
            .with_state(state)
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request.request_id().unwrap_or("-"),
                )
            }));

        if let Some(limiter) = self.limiter {
            router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }
        if self.access.has_allow_list() {
            router = router.layer(middleware::from_fn_with_state(
                self.access.clone(),
                allow_list_middleware,
            ));
        }
        if self.access.has_deny_list() {
            router = router.layer(middleware::from_fn_with_state(
                self.access.clone(),
                deny_list_middleware,
            ));
        }

        router
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }
}

/// Hand the request to the most specific compiled route.
async fn dispatch(State(state): State<GatewayState>, request: Request<Body>) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let Some(route) = state.table.match_path(&path) else {
        tracing::debug!(path = %path, "No route matched");
        metrics::record_request("none", method.as_str(), StatusCode::NOT_FOUND.as_u16());
        return error_response(StatusCode::NOT_FOUND, None);
    };

    let name = route.name.clone();
    let response = match route.handler.clone().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    metrics::record_request(&name, method.as_str(), response.status().as_u16());
    response
}

async fn method_not_allowed() -> Response {
    error_response(StatusCode::METHOD_NOT_ALLOWED, None)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!(panic = %message, "Request handler panicked");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, None)
}
