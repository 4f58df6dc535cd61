use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The category a failed request falls into.
///
/// Exactly one kind applies per failed request. The kind decides which side
/// effects ran (notification, redirect, session wipe) before the error was
/// returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// HTTP 404
    NotFound,
    /// HTTP 401 from a login, register or password endpoint
    InvalidCredentials,
    /// HTTP 401 from any other endpoint; the session has expired
    Unauthenticated,
    /// HTTP 403
    Forbidden,
    /// HTTP 500
    ServerError,
    /// HTTP 503
    ServiceUnavailable,
    /// HTTP 429
    RateLimited,
    /// Any other non-success HTTP status
    Http,
    /// The server reported a failure in-band with a `type: "error"` stream line
    Stream,
    /// The progress stream ended without a final payload
    StreamIncomplete,
    /// Connection, request or body transfer failure
    Network,
    /// The request exceeded the configured timeout
    Timeout,
    /// The caller cancelled the request
    Cancelled,
    /// Anything else, such as an undecodable JSON body
    Unexpected,
    /// The underlying HTTP client could not be constructed
    ClientBuild,
}

impl ErrorKind {
    /// Short machine-readable name, stable across releases.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::ServerError => "server_error",
            Self::ServiceUnavailable => "service_unavailable",
            Self::RateLimited => "rate_limited",
            Self::Http => "http",
            Self::Stream => "stream",
            Self::StreamIncomplete => "stream_incomplete",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Unexpected => "unexpected",
            Self::ClientBuild => "client_build",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure returned by every [`ApiClient`](crate::ApiClient) call.
///
/// Built once when a request fails and never modified afterwards. The
/// message is already user-presentable; the same text was passed to the
/// [`Notifier`](crate::Notifier) unless the error is silent or the kind
/// suppresses notifications.
///
/// # Example
///
/// ```ignore
/// match client.get("/api/briefs").await {
///     Err(e) if e.kind() == ErrorKind::Unauthenticated => {
///         // Redirect already happened, nothing to show.
///     }
///     Err(e) if e.is_silent() => {}
///     Err(e) => tracing::error!("{} failed ({}): {}", e.endpoint(), e.kind(), e),
///     Ok(body) => render(body),
/// }
/// ```
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    endpoint: String,
    timestamp: DateTime<Utc>,
    silent: bool,
    #[source]
    source: Option<BoxError>,
}

impl ApiError {
    pub(crate) fn new(
        kind: ErrorKind,
        endpoint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            endpoint: endpoint.into(),
            timestamp: Utc::now(),
            silent: false,
            source: None,
        }
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub(crate) fn silenced(mut self) -> Self {
        self.silent = true;
        self
    }

    pub(crate) fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status of the failed response. `None` for failures that never
    /// produced a status (network, timeout) or were signalled in-band.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// The endpoint path the request was issued against.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// `true` when the failure happened during an intentional logout and
    /// callers should not surface it.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Returns `true` for 401 responses, whichever branch classified them.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Unauthenticated | ErrorKind::InvalidCredentials
        )
    }
}
