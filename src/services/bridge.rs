//! External interpreter bridge.
//!
//! Each request runs the bundled runner in a fresh interpreter process:
//! the request is written to stdin as a raw HTTP/1.1 message, and the
//! application's answer is read back from stdout in the same format.

use axum::{
    body::{Body, Bytes},
    http::{header, request::Parts, HeaderName, HeaderValue, Request, StatusCode},
    response::Response,
};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::http::response::error_response;

const RUNNER: &str = include_str!("bridge_runner.py");

/// Largest request body handed to the interpreter.
pub const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("interpreter '{interpreter}' is not available: {reason}")]
    InterpreterUnavailable { interpreter: String, reason: String },

    #[error("failed to run interpreter: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("bridge process exited with {status}: {stderr}")]
    Exited { status: ExitStatus, stderr: String },

    #[error("malformed bridge response: {0}")]
    MalformedResponse(&'static str),
}

/// Interpreter used when a service does not name one.
pub fn default_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Check that `interpreter --version` runs successfully.
pub async fn probe_interpreter(interpreter: &str) -> Result<(), BridgeError> {
    let unavailable = |reason: String| BridgeError::InterpreterUnavailable {
        interpreter: interpreter.to_string(),
        reason,
    };

    let output = Command::new(interpreter)
        .arg("--version")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| unavailable(e.to_string()))?;

    if !output.status.success() {
        return Err(unavailable(output.status.to_string()));
    }

    let version = if output.stdout.is_empty() { &output.stderr } else { &output.stdout };
    tracing::debug!(
        interpreter,
        version = %String::from_utf8_lossy(version).trim(),
        "Bridge interpreter found"
    );
    Ok(())
}

/// Write a request as an HTTP/1.1 message.
pub fn serialize_request(parts: &Parts, body: &[u8]) -> Vec<u8> {
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut out = Vec::with_capacity(256 + body.len());
    out.extend_from_slice(format!("{} {} HTTP/1.1\r\n", parts.method, target).as_bytes());
    for (name, value) in &parts.headers {
        if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("content-length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

/// Parse an HTTP/1.x response message produced by the runner.
pub fn parse_response(raw: &[u8]) -> Result<Response, BridgeError> {
    let (head, body) = split_head(raw).ok_or(BridgeError::MalformedResponse("missing header terminator"))?;
    let head = std::str::from_utf8(head).map_err(|_| BridgeError::MalformedResponse("header is not UTF-8"))?;
    let mut lines = head.lines();

    let status_line = lines.next().ok_or(BridgeError::MalformedResponse("empty response"))?;
    let mut fields = status_line.split_whitespace();
    match fields.next() {
        Some(version) if version.starts_with("HTTP/1.") => {}
        _ => return Err(BridgeError::MalformedResponse("bad status line")),
    }
    let status = fields
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or(BridgeError::MalformedResponse("bad status code"))?;

    let mut response = Response::new(Body::from(Bytes::copy_from_slice(body)));
    *response.status_mut() = status;

    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or(BridgeError::MalformedResponse("bad header line"))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| BridgeError::MalformedResponse("bad header name"))?;
        if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
            continue;
        }
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| BridgeError::MalformedResponse("bad header value"))?;
        response.headers_mut().append(name, value);
    }

    Ok(response)
}

fn split_head(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some((&raw[..pos], &raw[pos + 4..]));
    }
    raw.windows(2)
        .position(|w| w == b"\n\n")
        .map(|pos| (&raw[..pos], &raw[pos + 2..]))
}

/// Runs one application module through an interpreter.
#[derive(Debug, Clone)]
pub struct Bridge {
    name: Arc<str>,
    interpreter: Arc<str>,
    module: Arc<str>,
}

impl Bridge {
    pub fn new(name: &str, interpreter: &str, module: &str) -> Self {
        Self {
            name: Arc::from(name),
            interpreter: Arc::from(interpreter),
            module: Arc::from(module),
        }
    }

    pub async fn serve(&self, request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(service = %self.name, error = %e, "Bridge request body rejected");
                return error_response(StatusCode::PAYLOAD_TOO_LARGE, None);
            }
        };

        match self.run(&serialize_request(&parts, &body)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    service = %self.name,
                    module = %self.module,
                    path = %parts.uri.path(),
                    error = %e,
                    "Bridge request failed"
                );
                error_response(StatusCode::BAD_GATEWAY, None)
            }
        }
    }

    async fn run(&self, input: &[u8]) -> Result<Response, BridgeError> {
        let mut child = Command::new(self.interpreter.as_ref())
            .arg("-c")
            .arg(RUNNER)
            .arg(self.module.as_ref())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(BridgeError::Exited {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_response(&output.stdout)
    }
}
