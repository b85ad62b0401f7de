//! Development endpoints.
//!
//! `/debug` describes the running generation, as an HTML panel for
//! browsers and JSON otherwise. `/debug/log` returns the captured log
//! records.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::http::response::html_response;
use crate::http::server::GatewayState;
use crate::observability::LogRecord;
use crate::routing::ServiceSummary;
use crate::templates::{render_debug_panel, SERVER_STRING};

#[derive(Debug, Serialize)]
pub struct DebugInfo {
    pub server: &'static str,
    pub generation: u64,
    pub services: Vec<ServiceSummary>,
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("text/html"))
}

pub async fn debug_info(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    let services = state.table.summaries();
    if accepts_html(&headers) {
        return html_response(StatusCode::OK, render_debug_panel(state.generation, &services));
    }

    Json(DebugInfo {
        server: SERVER_STRING,
        generation: state.generation,
        services,
    })
    .into_response()
}

pub async fn debug_log(State(state): State<GatewayState>) -> Json<Vec<LogRecord>> {
    Json(state.logs.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn html_is_chosen_from_accept() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_html(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!accepts_html(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9"),
        );
        assert!(accepts_html(&headers));
    }
}
