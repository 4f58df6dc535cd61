//! Per-request configuration.

use crate::http::common::{AUTH_TOKEN_HEADER, NDJSON_CONTENT_TYPE, STREAM_PROGRESS_HEADER};
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::Form;
use serde_json::Value;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Receives the `data` of every `stage` event of a progress stream.
pub type ProgressCallback = Box<dyn FnMut(Value) + Send>;

/// How a successful response body is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// JSON when the response says so, otherwise `{"message": <text>}`.
    #[default]
    Json,
    /// Raw bytes together with the response headers and status.
    Blob,
}

/// Request payload.
#[derive(Debug)]
pub enum RequestBody {
    /// Serialized as JSON; `Content-Type: application/json` unless overridden.
    Json(Value),
    /// Sent as `multipart/form-data`; the boundary header comes from the
    /// HTTP runtime and is never set explicitly.
    Multipart(Form),
}

impl RequestBody {
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }
}

/// Options for [`ApiClient::request`](crate::ApiClient::request).
///
/// # Example
///
/// ```
/// use marketplace_client::RequestOptions;
/// use serde_json::json;
///
/// let options = RequestOptions::post()
///     .with_json(json!({"prompt": "A fox in watercolor"}))
///     .with_progress(|stage| println!("stage: {stage}"));
/// assert!(options.is_streaming());
/// ```
pub struct RequestOptions {
    pub(crate) method: Method,
    pub(crate) body: Option<RequestBody>,
    pub(crate) headers: HeaderMap,
    pub(crate) response_type: ResponseType,
    pub(crate) on_progress: Option<ProgressCallback>,
    pub(crate) cancel: Option<CancellationToken>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("response_type", &self.response_type)
            .field("on_progress", &self.on_progress.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl RequestOptions {
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: None,
            headers: HeaderMap::new(),
            response_type: ResponseType::Json,
            on_progress: None,
            cancel: None,
        }
    }

    #[must_use]
    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    #[must_use]
    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    #[must_use]
    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    #[must_use]
    pub fn patch() -> Self {
        Self::new(Method::PATCH)
    }

    #[must_use]
    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    #[must_use]
    pub fn with_multipart(mut self, form: Form) -> Self {
        self.body = Some(RequestBody::Multipart(form));
        self
    }

    /// Adds a header. Caller headers win over computed ones, except
    /// `Content-Type` on multipart bodies.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Returns the body as raw bytes with headers and status.
    #[must_use]
    pub fn blob(mut self) -> Self {
        self.response_type = ResponseType::Blob;
        self
    }

    /// Requests an NDJSON progress stream; `callback` receives each stage.
    #[must_use]
    pub fn with_progress(mut self, callback: impl FnMut(Value) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Abandons the request when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.on_progress.is_some()
    }
}

/// Computes the outgoing header set.
///
/// - `Content-Type: application/json` only for a non-multipart body when the
///   caller set none; any `Content-Type` is dropped for multipart bodies
/// - `x-stream-progress: 1` and a default `Accept: application/x-ndjson`
///   for streaming requests
/// - `auth-token` when a token is available
pub(crate) fn build_headers(
    caller: &HeaderMap,
    body: Option<&RequestBody>,
    streaming: bool,
    token: Option<&str>,
) -> HeaderMap {
    let mut headers = caller.clone();

    match body {
        Some(RequestBody::Multipart(_)) => {
            headers.remove(CONTENT_TYPE);
        }
        Some(RequestBody::Json(_)) if !headers.contains_key(CONTENT_TYPE) => {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        _ => {}
    }

    if streaming {
        headers.insert(
            HeaderName::from_static(STREAM_PROGRESS_HEADER),
            HeaderValue::from_static("1"),
        );
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static(NDJSON_CONTENT_TYPE));
        }
    }

    if let Some(token) = token {
        match HeaderValue::from_str(token) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(HeaderName::from_static(AUTH_TOKEN_HEADER), value);
            }
            Err(_) => warn!("Stored session token is not a valid header value; sending without it"),
        }
    }

    headers
}
