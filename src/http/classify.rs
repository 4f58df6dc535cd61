//! Maps failed requests onto [`ErrorKind`]s, messages and side effects.
//!
//! Classification is pure: it decides what should happen and the client
//! carries it out. Exactly one row applies per failure.

use super::error_helpers::server_message;
use crate::errors::ErrorKind;
use serde_json::Value;

pub const NOT_FOUND_MESSAGE: &str = "The requested resource was not found.";
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";
pub const SESSION_ENDED_MESSAGE: &str = "Session ended";
pub const LOGIN_REQUIRED_MESSAGE: &str = "Please log in to continue";
pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action.";
pub const SERVER_ERROR_MESSAGE: &str = "Server error. Please try again later.";
pub const UNAVAILABLE_MESSAGE: &str = "Service is temporarily unavailable. Please try again later.";
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please slow down.";
pub const STREAM_ERROR_MESSAGE: &str = "Stream reported an error";
pub const STREAM_INCOMPLETE_MESSAGE: &str = "Stream ended without a completion payload";
pub const NETWORK_MESSAGE: &str = "Network error. Please check your connection.";
pub const TIMEOUT_MESSAGE: &str = "Request timed out. Please try again.";
pub const CANCELLED_MESSAGE: &str = "Request was cancelled";
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred.";

/// Path fragments identifying endpoints where a 401 means "wrong credentials"
/// rather than "session expired".
const AUTH_ENDPOINT_MARKERS: &[&str] = &["/login", "/register", "password"];

/// Where the browser is sent after a session expires.
pub const REDIRECT_PATH: &str = "/";

/// Outcome of classifying one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    /// Show `message` through the notifier.
    pub notify: bool,
    /// Mark the error silent for callers.
    pub silent: bool,
    /// Clear token and user, then redirect once.
    pub expire_session: bool,
}

impl Classification {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            notify: true,
            silent: false,
            expire_session: false,
        }
    }

    fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    fn quiet(mut self) -> Self {
        self.notify = false;
        self
    }

    /// Logout suppresses every notification and the expiry redirect.
    fn during_logout(mut self, logging_out: bool) -> Self {
        if logging_out {
            self.notify = false;
            self.expire_session = false;
        }
        self
    }
}

/// Returns `true` for login, registration and password endpoints.
#[must_use]
pub fn is_auth_endpoint(endpoint: &str) -> bool {
    let path = endpoint.split('?').next().unwrap_or(endpoint);
    AUTH_ENDPOINT_MARKERS.iter().any(|m| path.contains(m))
}

/// Classifies a non-success HTTP response.
///
/// `payload` is the decoded body (JSON, or raw text wrapped as
/// `{"message": ...}`).
#[must_use]
pub fn classify_status(
    status: u16,
    endpoint: &str,
    payload: &Value,
    logging_out: bool,
) -> Classification {
    let server = server_message(payload);

    let classification = match status {
        404 => {
            let mentions_not_found = server
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains("not found"));
            let c = Classification::new(ErrorKind::NotFound, NOT_FOUND_MESSAGE).status(404);
            if mentions_not_found { c.quiet() } else { c }
        }
        401 if is_auth_endpoint(endpoint) => Classification::new(
            ErrorKind::InvalidCredentials,
            server.unwrap_or_else(|| INVALID_CREDENTIALS_MESSAGE.to_string()),
        )
        .status(401),
        401 if logging_out => {
            let mut c = Classification::new(ErrorKind::Unauthenticated, SESSION_ENDED_MESSAGE)
                .status(401)
                .quiet();
            c.silent = true;
            c
        }
        401 => {
            let mut c = Classification::new(ErrorKind::Unauthenticated, LOGIN_REQUIRED_MESSAGE)
                .status(401)
                .quiet();
            c.expire_session = true;
            c
        }
        403 => Classification::new(ErrorKind::Forbidden, FORBIDDEN_MESSAGE).status(403),
        500 => Classification::new(ErrorKind::ServerError, SERVER_ERROR_MESSAGE).status(500),
        503 => Classification::new(ErrorKind::ServiceUnavailable, UNAVAILABLE_MESSAGE).status(503),
        429 => Classification::new(ErrorKind::RateLimited, RATE_LIMITED_MESSAGE).status(429),
        other => Classification::new(
            ErrorKind::Http,
            server.unwrap_or_else(|| format!("HTTP error! status: {other}")),
        )
        .status(other),
    };

    classification.during_logout(logging_out)
}

/// Classifies an in-band `type: "error"` stream line.
#[must_use]
pub fn classify_stream_error(payload: &Value, logging_out: bool) -> Classification {
    Classification::new(
        ErrorKind::Stream,
        server_message(payload).unwrap_or_else(|| STREAM_ERROR_MESSAGE.to_string()),
    )
    .during_logout(logging_out)
}

/// Classifies a failure that produced no usable HTTP response.
#[must_use]
pub fn classify_failure(kind: ErrorKind, logging_out: bool) -> Classification {
    let c = match kind {
        ErrorKind::Network => Classification::new(kind, NETWORK_MESSAGE),
        ErrorKind::Timeout => Classification::new(kind, TIMEOUT_MESSAGE),
        ErrorKind::StreamIncomplete => Classification::new(kind, STREAM_INCOMPLETE_MESSAGE),
        ErrorKind::Cancelled => Classification::new(kind, CANCELLED_MESSAGE).quiet(),
        _ => Classification::new(ErrorKind::Unexpected, UNEXPECTED_MESSAGE),
    };
    c.during_logout(logging_out)
}

/// Picks the kind for a transport-level `reqwest` error.
#[must_use]
pub fn transport_kind(error: &reqwest::Error) -> ErrorKind {
    if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_connect() || error.is_request() || error.is_body() {
        ErrorKind::Network
    } else {
        ErrorKind::Unexpected
    }
}
