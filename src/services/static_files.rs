//! Static file serving with optional directory browsing.
//!
//! Per request:
//! 1. strip the route prefix and resolve the remainder under the root
//! 2. missing path → 404
//! 3. regular file → bytes with a content type from the extension
//! 4. directory → `index.html`, else a listing when enabled, else 404
//! 5. any other I/O failure → 500
//!
//! Resolution refuses `..` segments, and the canonical result must stay
//! under the canonical root, so symlinks cannot escape it either.

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, StatusCode},
    response::Response,
};
use chrono::{DateTime, Local};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::http::response::{error_response, html_response};
use crate::routing::PathPrefixMatcher;
use crate::templates::{format_file_size, render_directory, DirectoryListing, ListingEntry};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Serves one directory tree under a route prefix.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    name: Arc<str>,
    matcher: PathPrefixMatcher,
    root: PathBuf,
    show_directory_browser: bool,
}

impl StaticFiles {
    /// `root` must already be canonical.
    pub fn new(name: &str, matcher: PathPrefixMatcher, root: PathBuf, show_directory_browser: bool) -> Self {
        Self {
            name: Arc::from(name),
            matcher,
            root,
            show_directory_browser,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join the part of `request_path` after the prefix onto the root.
    ///
    /// Returns `None` for paths that cannot be decoded or that try to climb
    /// out of the root.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let remainder = self.matcher.strip(request_path);
        let decoded = urlencoding::decode(remainder).ok()?;

        let mut resolved = self.root.clone();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return None,
                s if s.contains('\\') || s.contains('\0') => return None,
                s => resolved.push(s),
            }
        }
        Some(resolved)
    }

    pub async fn serve(&self, request: Request<Body>) -> Response {
        if request.method() != Method::GET && request.method() != Method::HEAD {
            let mut response = error_response(StatusCode::METHOD_NOT_ALLOWED, None);
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            return response;
        }

        let request_path = request.uri().path();
        let Some(candidate) = self.resolve(request_path) else {
            tracing::warn!(service = %self.name, path = %request_path, "Rejected path outside static root");
            return error_response(StatusCode::NOT_FOUND, None);
        };

        let path = match tokio::fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(e) if is_not_found(&e) => return error_response(StatusCode::NOT_FOUND, None),
            Err(e) => return self.internal_error(request_path, &e),
        };
        if !path.starts_with(&self.root) {
            tracing::warn!(service = %self.name, path = %request_path, "Rejected symlink leaving static root");
            return error_response(StatusCode::NOT_FOUND, None);
        }

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if is_not_found(&e) => return error_response(StatusCode::NOT_FOUND, None),
            Err(e) => return self.internal_error(request_path, &e),
        };

        if !metadata.is_dir() {
            return self.serve_file(&path, request_path).await;
        }

        let index = path.join("index.html");
        if tokio::fs::metadata(&index).await.map(|m| m.is_file()).unwrap_or(false) {
            return self.serve_file(&index, request_path).await;
        }

        if !self.show_directory_browser {
            return error_response(StatusCode::NOT_FOUND, None);
        }

        match self.listing(&path, request_path).await {
            Ok(listing) => html_response(StatusCode::OK, render_directory(&listing)),
            Err(e) => self.internal_error(request_path, &e),
        }
    }

    async fn serve_file(&self, path: &Path, request_path: &str) -> Response {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let content_type = mime_guess::from_path(path).first_or_octet_stream();
                let mut response = Response::new(Body::from(bytes));
                if let Ok(value) = HeaderValue::from_str(content_type.as_ref()) {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                response
            }
            Err(e) if is_not_found(&e) => error_response(StatusCode::NOT_FOUND, None),
            Err(e) => self.internal_error(request_path, &e),
        }
    }

    /// Collect listing data for `dir`, linked relative to `request_path`.
    pub async fn listing(&self, dir: &Path, request_path: &str) -> std::io::Result<DirectoryListing> {
        let base = request_path.trim_end_matches('/');
        let mut entries = Vec::new();

        let mut reader = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Links that cannot be followed are listed as the link itself.
            let metadata = match tokio::fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(_) => match entry.metadata().await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        tracing::warn!(service = %self.name, entry = %name, error = %e, "Skipping unreadable directory entry");
                        continue;
                    }
                },
            };
            let modified = metadata
                .modified()
                .map(|time| DateTime::<Local>::from(time).format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default();

            let mut href = format!("{base}/{}", urlencoding::encode(&name));
            if metadata.is_dir() {
                href.push('/');
            }

            entries.push(ListingEntry {
                name,
                href,
                size: format_file_size(metadata.len()),
                modified,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let parent_href = if dir == self.root {
            None
        } else {
            let parent = base.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("");
            Some(format!("{parent}/"))
        };

        let title = urlencoding::decode(request_path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| request_path.to_string());

        Ok(DirectoryListing {
            title,
            parent_href,
            entries,
        })
    }

    fn internal_error(&self, request_path: &str, error: &std::io::Error) -> Response {
        tracing::error!(service = %self.name, path = %request_path, error = %error, "Static file I/O failure");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, None)
    }
}

fn is_not_found(error: &std::io::Error) -> bool {
    matches!(error.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}
