//! Wire-level debugging via the `LOUD_WIRE` environment variable.
//!
//! When `LOUD_WIRE` is set to any value, outgoing requests, response
//! statuses, response bodies and individual NDJSON progress lines are printed
//! to stderr with colors.
//!
//! ```bash
//! LOUD_WIRE=1 cargo test --test streaming_tests
//! ```
//!
//! - Green `>>>` for outgoing requests
//! - Red `<<<` for incoming responses
//! - Blue `NDJSON` for progress stream lines
//!
//! Credentials are never printed: `token` and `password` values are replaced
//! in bodies and query strings, and the `auth-token` header is reported only
//! as present or absent.

use chrono::Utc;
use colored::Colorize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Request ID counter for correlating requests with responses
static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

static ENABLED: OnceLock<bool> = OnceLock::new();

/// Check if LOUD_WIRE debugging is enabled.
///
/// Cached after the first check, so `LOUD_WIRE` must be set before the
/// first request is made.
#[must_use]
pub fn is_enabled() -> bool {
    *ENABLED.get_or_init(|| std::env::var("LOUD_WIRE").is_ok())
}

#[must_use]
pub fn next_request_id() -> usize {
    REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Fields whose values are replaced before printing.
const REDACT_FIELDS: &[&str] = &["token", "password", "newPassword", "currentPassword"];

/// Strings longer than this are cut (generated content, inline base64 images).
const TRUNCATE_THRESHOLD: usize = 300;

const REDACTED: &str = "[redacted]";

/// Redacts credentials and truncates long strings in a JSON tree.
fn sanitize(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if REDACT_FIELDS.contains(&key.as_str()) && val.is_string() {
                    *val = serde_json::Value::String(REDACTED.to_string());
                } else {
                    sanitize(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                sanitize(item);
            }
        }
        serde_json::Value::String(s) => {
            if s.len() > TRUNCATE_THRESHOLD {
                let cut = floor_char_boundary(s, TRUNCATE_THRESHOLD);
                *s = format!("{}...", &s[..cut]);
            }
        }
        _ => {}
    }
}

fn is_credential_key(key: &str) -> bool {
    let key = urlencoding::decode(key).map_or_else(|_| key.into(), |k| k);
    REDACT_FIELDS
        .iter()
        .any(|field| field.eq_ignore_ascii_case(&key))
}

/// Replaces credential values in a URL's query string.
pub(crate) fn redact_url(url: &str) -> String {
    let Some((base, rest)) = url.split_once('?') else {
        return url.to_string();
    };
    let (query, fragment) = match rest.split_once('#') {
        Some((query, fragment)) => (query, Some(fragment)),
        None => (rest, None),
    };

    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_credential_key(key) => format!("{key}={REDACTED}"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");

    match fragment {
        Some(fragment) => format!("{base}?{query}#{fragment}"),
        None => format!("{base}?{query}"),
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    (0..=max.min(s.len()))
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0)
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn prefix(request_id: usize) -> String {
    let ts = timestamp().dimmed();
    format!(
        "{} {} {}",
        "[LOUD_WIRE]".bold(),
        ts,
        format!("[REQ#{}]", request_id).cyan()
    )
}

fn print_json_lines(prefix: &str, value: &serde_json::Value) {
    if let Ok(colored) = colored_json::to_colored_json_auto(value) {
        for line in colored.lines() {
            eprintln!("{prefix} {line}");
        }
    } else if let Ok(pretty) = serde_json::to_string_pretty(value) {
        for line in pretty.lines() {
            eprintln!("{prefix} {line}");
        }
    }
}

fn print_body(prefix: &str, label: colored::ColoredString, body: &str, limit: usize) {
    if let Ok(mut parsed) = serde_json::from_str::<serde_json::Value>(body) {
        sanitize(&mut parsed);
        eprintln!("{prefix} {label}:");
        print_json_lines(prefix, &parsed);
    } else {
        let cut = floor_char_boundary(body, limit);
        let suffix = if cut < body.len() { "..." } else { "" };
        eprintln!("{prefix} {label}: {}{suffix}", &body[..cut]);
    }
}

/// Log an outgoing HTTP request.
pub fn log_request(
    request_id: usize,
    method: &str,
    url: &str,
    authenticated: bool,
    body: Option<&str>,
) {
    if !is_enabled() {
        return;
    }

    let prefix = prefix(request_id);
    let direction = ">>>".green().bold();
    let auth = if authenticated {
        "auth-token: present".dimmed()
    } else {
        "auth-token: absent".dimmed()
    };

    let url = redact_url(url);
    eprintln!("{prefix} {direction} {method} {url} ({auth})");

    if let Some(body) = body {
        print_body(&prefix, "Body".green(), body, 500);
    }
}

/// Log an incoming HTTP response status.
pub fn log_response_status(request_id: usize, status: u16) {
    if !is_enabled() {
        return;
    }

    let prefix = prefix(request_id);
    let direction = "<<<".red().bold();
    let status_text = if status < 300 {
        format!("{status} OK").green()
    } else {
        format!("{status} ERROR").red()
    };

    eprintln!("{prefix} {direction} {status_text}");
}

/// Log an incoming HTTP response body.
pub fn log_response_body(request_id: usize, body: &str) {
    if !is_enabled() {
        return;
    }

    print_body(&prefix(request_id), "Response".red(), body, 1000);
}

/// Log a binary response without dumping it.
pub fn log_response_blob(request_id: usize, len: usize, content_type: Option<&str>) {
    if !is_enabled() {
        return;
    }

    let prefix = prefix(request_id);
    eprintln!(
        "{prefix} {}: {len} bytes ({})",
        "Blob".red(),
        content_type.unwrap_or("unknown type")
    );
}

/// Log one NDJSON line of a progress stream.
pub fn log_stream_line(request_id: usize, line: &str) {
    if !is_enabled() {
        return;
    }

    print_body(&prefix(request_id), "NDJSON".blue().bold(), line, 500);
}
