//! Reverse proxy engine.
//!
//! # Responsibilities
//! - Rewrite the request URI onto the configured target origin
//! - Set X-Forwarded-* and Via headers, strip hop-by-hop headers
//! - Forward with a single attempt (no retries)
//! - Replace upstream error bodies with a rendered error document
//!
//! # Design Decisions
//! - The full request path is forwarded, joined onto the target's path
//! - Network failures surface as 502; nothing is retried
//! - Upstream response bodies stream through untouched unless intercepted

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        Request, Response, StatusCode, Uri, Version,
    },
};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::http::response::{error_response, HTML_CONTENT_TYPE};
use crate::security::source_ip;
use crate::templates::render_error;

/// Identifies this gateway in `Via` headers.
const VIA_PSEUDONYM: &str = "gatehouse";

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "upgrade",
];

/// HTTP client shared by every proxy service of one generation.
pub type ProxyClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Build the upstream client, able to reach both `http` and `https` targets.
pub fn build_client() -> ProxyClient {
    let connector = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Problems with a configured proxy target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("'{0}' is not an absolute URL: {1}")]
    Invalid(String, String),
    #[error("'{0}' has no host")]
    MissingHost(String),
    #[error("scheme '{0}' is not supported, targets must be http or https")]
    UnsupportedScheme(String),
}

/// A parsed upstream origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    scheme: &'static str,
    authority: String,
    base_path: String,
    base_query: Option<String>,
}

impl ProxyTarget {
    /// Parse a target URL such as `http://127.0.0.1:3000/base`.
    pub fn parse(target: &str) -> Result<Self, TargetError> {
        let url = Url::parse(target).map_err(|e| TargetError::Invalid(target.to_string(), e.to_string()))?;

        let scheme = match url.scheme() {
            "http" => "http",
            "https" => "https",
            other => return Err(TargetError::UnsupportedScheme(other.to_string())),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TargetError::MissingHost(target.to_string()))?;

        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(Self {
            scheme,
            authority,
            base_path: url.path().to_string(),
            base_query: url.query().map(str::to_string),
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Map an inbound URI onto this target.
    pub fn rewrite_uri(&self, inbound: &Uri) -> Result<Uri, axum::http::Error> {
        let path = join_paths(&self.base_path, inbound.path());
        let query = match (self.base_query.as_deref(), inbound.query()) {
            (Some(base), Some(extra)) if !base.is_empty() => Some(format!("{base}&{extra}")),
            (_, Some(extra)) => Some(extra.to_string()),
            (Some(base), None) => Some(base.to_string()),
            (None, None) => None,
        };
        let path_and_query = match query {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };

        Uri::builder()
            .scheme(self.scheme)
            .authority(self.authority.as_str())
            .path_and_query(path_and_query)
            .build()
    }
}

fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Remove hop-by-hop headers, including any named in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::TRANSFER_ENCODING);
}

fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// A reverse proxy to one fixed target.
#[derive(Clone)]
pub struct ReverseProxy {
    name: Arc<str>,
    target: ProxyTarget,
    forward_errors: bool,
    secure: bool,
    client: ProxyClient,
}

impl ReverseProxy {
    /// `secure` reports whether the inbound listener terminates TLS.
    pub fn new(name: &str, target: ProxyTarget, forward_errors: bool, secure: bool, client: ProxyClient) -> Self {
        Self {
            name: Arc::from(name),
            target,
            forward_errors,
            secure,
            client,
        }
    }

    /// Turn an inbound request into the upstream request.
    pub fn rewrite_request(&self, request: Request<Body>) -> Result<Request<Body>, axum::http::Error> {
        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| source_ip(addr));
        let (mut parts, body) = request.into_parts();

        let inbound_version = parts.version;
        let inbound_host = parts
            .headers
            .get(header::HOST)
            .cloned()
            .or_else(|| parts.uri.authority().and_then(|a| HeaderValue::from_str(a.as_str()).ok()));

        parts.uri = self.target.rewrite_uri(&parts.uri)?;
        parts.version = Version::HTTP_11;

        let headers = &mut parts.headers;
        strip_hop_by_hop(headers);
        headers.insert(header::HOST, HeaderValue::from_str(self.target.authority())?);

        if let Some(ip) = client_addr {
            let forwarded_for = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) if !prior.is_empty() => format!("{prior}, {ip}"),
                _ => ip.to_string(),
            };
            headers.insert(X_FORWARDED_FOR.clone(), HeaderValue::from_str(&forwarded_for)?);
        }
        match inbound_host {
            Some(host) => {
                headers.insert(X_FORWARDED_HOST.clone(), host);
            }
            None => {
                headers.remove(&X_FORWARDED_HOST);
            }
        }
        let proto = if self.secure { "https" } else { "http" };
        headers.insert(X_FORWARDED_PROTO.clone(), HeaderValue::from_static(proto));

        let via = format!("{} {VIA_PSEUDONYM}", version_label(inbound_version));
        headers.append(header::VIA, HeaderValue::from_str(&via)?);

        Ok(Request::from_parts(parts, body))
    }

    /// Replace the body of an upstream error response unless errors are
    /// forwarded verbatim.
    pub fn intercept(&self, mut response: Response<Body>) -> Response<Body> {
        let status = response.status();
        if status.as_u16() < 400 || self.forward_errors {
            return response;
        }

        let document = render_error(status, None);
        let headers = response.headers_mut();
        headers.remove(header::CONTENT_ENCODING);
        headers.remove(header::TRANSFER_ENCODING);
        headers.remove(header::ETAG);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(document.len()));
        *response.body_mut() = Body::from(document);
        response
    }

    /// Forward one request and produce the client response.
    pub async fn forward(&self, request: Request<Body>) -> Response<Body> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let upstream_request = match self.rewrite_request(request) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(service = %self.name, path = %path, error = %e, "Failed to rewrite request");
                return error_response(StatusCode::BAD_REQUEST, None);
            }
        };
        let upstream_uri = upstream_request.uri().clone();

        match self.client.request(upstream_request).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                tracing::debug!(
                    service = %self.name,
                    method = %method,
                    upstream = %upstream_uri,
                    status = parts.status.as_u16(),
                    "Upstream responded"
                );
                self.intercept(Response::from_parts(parts, Body::new(body)))
            }
            Err(e) => {
                tracing::error!(
                    service = %self.name,
                    method = %method,
                    upstream = %upstream_uri,
                    error = %e,
                    "Upstream request failed"
                );
                error_response(StatusCode::BAD_GATEWAY, None)
            }
        }
    }
}
