//! Error document responses.
//!
//! Every failure a client can observe is rendered as an HTML document with
//! the status code, its reason phrase and the server identification.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};

use crate::templates::{render_error, SERVER_STRING};

/// Content type used for every generated HTML document.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Build a rendered error response.
pub fn error_response(status: StatusCode, detail: Option<&str>) -> Response {
    html_response(status, render_error(status, detail))
}

/// Build an HTML response with the given body.
pub fn html_response(status: StatusCode, body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_STRING));
    response
}
