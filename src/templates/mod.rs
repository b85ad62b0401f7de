//! HTML document rendering.
//!
//! Templates are compiled into the binary and filled by placeholder
//! substitution. Every dynamic value is HTML-escaped before insertion.

use axum::http::StatusCode;
use std::fmt::Write;

use crate::routing::ServiceSummary;

/// Server identification string shown on every generated document.
pub const SERVER_STRING: &str = concat!("gatehouse/", env!("CARGO_PKG_VERSION"));

const ERROR_TEMPLATE: &str = include_str!("error.html");
const DIRECTORY_TEMPLATE: &str = include_str!("directory.html");
const DEBUG_TEMPLATE: &str = include_str!("debug.html");

/// Escape text for inclusion in HTML content or a quoted attribute.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Standard reason phrase for a status code.
pub fn reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Status")
}

/// Render the error document for `status`, with an optional extra message.
pub fn render_error(status: StatusCode, detail: Option<&str>) -> String {
    let detail = match detail {
        Some(text) => format!(
            "<p style=\"font-size: 18px; color: #555;\">{}</p>",
            escape_html(text)
        ),
        None => String::new(),
    };

    ERROR_TEMPLATE
        .replace("{{CODE}}", status.as_str())
        .replace("{{TEXT}}", reason_phrase(status))
        .replace("{{DETAIL}}", &detail)
        .replace("{{SERVER}}", SERVER_STRING)
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub href: String,
    pub size: String,
    pub modified: String,
}

/// Data for a rendered directory listing.
#[derive(Debug, Clone, Default)]
pub struct DirectoryListing {
    /// Heading shown at the top, usually the request path.
    pub title: String,
    /// Link to the parent directory, absent at the service root.
    pub parent_href: Option<String>,
    pub entries: Vec<ListingEntry>,
}

/// Render a directory listing page.
pub fn render_directory(listing: &DirectoryListing) -> String {
    let mut rows = String::new();

    if let Some(parent) = &listing.parent_href {
        let _ = writeln!(
            rows,
            "            <tr><td><a href=\"{}\">../</a></td><td>-</td><td>-</td></tr>",
            escape_html(parent)
        );
    }

    for entry in &listing.entries {
        let _ = writeln!(
            rows,
            "            <tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td></tr>",
            escape_html(&entry.href),
            escape_html(&entry.name),
            escape_html(&entry.size),
            escape_html(&entry.modified),
        );
    }

    DIRECTORY_TEMPLATE
        .replace("{{TITLE}}", &escape_html(&listing.title))
        .replace("{{ROWS}}", rows.trim_end())
        .replace("{{SERVER}}", SERVER_STRING)
}

/// Render the development debug panel.
pub fn render_debug_panel(generation: u64, services: &[ServiceSummary]) -> String {
    let mut rows = String::new();
    for service in services {
        let _ = writeln!(
            rows,
            "            <tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&service.name),
            service.mode,
            escape_html(&service.route),
        );
    }

    DEBUG_TEMPLATE
        .replace("{{SERVER}}", SERVER_STRING)
        .replace("{{GENERATION}}", &generation.to_string())
        .replace("{{ROWS}}", rows.trim_end())
}

/// Human-readable size with binary prefixes.
///
/// Sizes under 1024 are shown in bytes; larger sizes are scaled by 1024
/// with one decimal place.
pub fn format_file_size(size: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

    if size < UNIT {
        return format!("{size} B");
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = size / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    format!("{:.1} {}B", size as f64 / div as f64, PREFIXES[exp])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceMode;

    #[test]
    fn file_sizes_use_binary_prefixes() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1_048_576), "1.0 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5.0 GB");
        assert_eq!(format_file_size(u64::MAX), "16.0 EB");
    }

    #[test]
    fn error_document_carries_code_reason_and_server() {
        let body = render_error(StatusCode::NOT_FOUND, None);
        assert!(body.contains("404"));
        assert!(body.contains("Not Found"));
        assert!(body.contains(SERVER_STRING));
        assert!(!body.contains("{{"));
    }

    #[test]
    fn error_detail_is_escaped() {
        let body = render_error(StatusCode::TOO_MANY_REQUESTS, Some("<script>"));
        assert!(body.contains("Too Many Requests"));
        assert!(body.contains("&lt;script&gt;"));
        assert!(!body.contains("<script>"));
    }

    #[test]
    fn listing_includes_parent_link_only_when_given() {
        let mut listing = DirectoryListing {
            title: "/files/".into(),
            parent_href: None,
            entries: vec![ListingEntry {
                name: "a.txt".into(),
                href: "/files/a.txt".into(),
                size: "1 B".into(),
                modified: "2024-01-01 00:00:00".into(),
            }],
        };
        let body = render_directory(&listing);
        assert!(body.contains("href=\"/files/a.txt\""));
        assert!(!body.contains("../"));

        listing.parent_href = Some("/files/".into());
        assert!(render_directory(&listing).contains("../"));
    }

    #[test]
    fn debug_panel_lists_services() {
        let body = render_debug_panel(
            3,
            &[ServiceSummary {
                name: "api".into(),
                mode: ServiceMode::ReverseProxy,
                route: "/api".into(),
            }],
        );
        assert!(body.contains("generation 3"));
        assert!(body.contains("reverseProxy"));
        assert!(body.contains("/debug/log"));
    }
}
