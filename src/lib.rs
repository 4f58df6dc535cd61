//! HTTP client for the creative marketplace backend.
//!
//! Every backend call goes through [`ApiClient::request`] (or one of its verb
//! helpers). The client attaches the session token, shapes JSON and multipart
//! payloads, follows NDJSON progress streams, returns binary downloads with
//! their headers, and turns every failure into a classified [`ApiError`].
//!
//! # Example
//!
//! ```no_run
//! use marketplace_client::{ApiClient, ErrorKind};
//!
//! # async fn example() -> Result<(), marketplace_client::ApiError> {
//! let client = ApiClient::from_env()?;
//! client.session().set_token("session-token");
//!
//! match client.get("/api/briefs").await {
//!     Ok(briefs) => println!("{briefs}"),
//!     Err(e) if e.kind() == ErrorKind::Unauthenticated => {
//!         // The session was cleared and the login redirect already issued.
//!     }
//!     Err(e) => eprintln!("{}: {}", e.kind(), e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Debugging
//!
//! Set `LOUD_WIRE=1` to pretty-print every request, response and stream line
//! to stderr. Tokens and passwords are redacted.

mod client;
mod config;
mod errors;
mod http;
mod notify;
mod request;
mod response;
mod session;

#[cfg(test)]
mod proptest_tests;

// Client facade
pub use client::{ApiClient, ClientBuilder};

// Configuration
pub use config::{BASE_URL_ENV, CONNECT_TIMEOUT_ENV, ClientConfig, TIMEOUT_ENV};

// Errors
pub use errors::{ApiError, ErrorKind};

// Session state and storage
pub use session::{
    FileStore, LOGGING_OUT_KEY, MemoryStore, SessionState, SessionStore, TOKEN_KEY, USER_KEY,
};

// Side-effect hooks
pub use notify::{Navigator, Notifier, TracingNavigator, TracingNotifier};

// Request and response shapes
pub use request::{ProgressCallback, RequestBody, RequestOptions, ResponseType};
pub use response::{ApiResponse, BlobResponse, Envelope};

// Wire-level helpers
pub use http::common::{
    AUTH_TOKEN_HEADER, DEFAULT_BASE_URL, NDJSON_CONTENT_TYPE, STREAM_PROGRESS_HEADER, with_query,
};
pub use http::ndjson::{
    StreamError, StreamEvent, StreamOutcome, decode_progress_stream, parse_ndjson_stream,
};

// Re-exported so callers need not depend on these crates directly
pub use reqwest::multipart;
pub use tokio_util::sync::CancellationToken;
