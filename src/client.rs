use crate::config::ClientConfig;
use crate::errors::{ApiError, ErrorKind};
use crate::http::classify::{
    self, Classification, REDIRECT_PATH, classify_failure, classify_status, classify_stream_error,
};
use crate::http::common::construct_url;
use crate::http::error_helpers::{payload_from_bytes, preview, wrap_text_body};
use crate::http::loud_wire;
use crate::http::ndjson::{StreamError, StreamOutcome, decode_progress_stream};
use crate::notify::{Navigator, Notifier, TracingNavigator, TracingNotifier};
use crate::request::{RequestBody, RequestOptions, ResponseType, build_headers};
use crate::response::{ApiResponse, BlobResponse};
use crate::session::SessionState;
use bytes::Bytes;
use reqwest::Client as ReqwestClient;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::multipart::Form;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Body of a response, read according to the request's mode.
enum Body {
    Json(Value),
    Blob(Bytes),
}

/// Runs `future` unless `cancel` fires first. `None` means cancelled.
async fn cancellable<F: Future>(
    cancel: Option<&CancellationToken>,
    future: F,
) -> Option<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => None,
            output = future => Some(output),
        },
        None => Some(future.await),
    }
}

/// The single entry point for backend calls.
///
/// Cloning is cheap; clones share the HTTP connection pool, the session
/// state and the notification hooks.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    #[allow(clippy::struct_field_names)]
    http_client: ReqwestClient,
    session: SessionState,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
}

/// Builder for `ApiClient` instances.
///
/// # Example
///
/// ```
/// use marketplace_client::{ApiClient, MemoryStore, SessionState};
/// use std::time::Duration;
///
/// let client = ApiClient::builder()
///     .base_url("https://api.example.com")
///     .connect_timeout(Duration::from_secs(10))
///     .session(SessionState::new(MemoryStore::default()))
///     .build()
///     .expect("client");
/// assert_eq!(client.base_url(), "https://api.example.com");
/// ```
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    session: Option<SessionState>,
    notifier: Option<Arc<dyn Notifier>>,
    navigator: Option<Arc<dyn Navigator>>,
    http_client: Option<ReqwestClient>,
}

impl ClientBuilder {
    /// Replaces every connection setting at once.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Sets the total request timeout.
    ///
    /// Progress streams for generation requests can run for minutes; leave
    /// this unset (the default) or generous when streaming.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn session(mut self, session: SessionState) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    #[must_use]
    pub fn navigator(mut self, navigator: impl Navigator + 'static) -> Self {
        self.navigator = Some(Arc::new(navigator));
        self
    }

    /// Uses an existing `reqwest` client. Timeouts set on this builder are
    /// then ignored.
    #[must_use]
    pub fn http_client(mut self, client: ReqwestClient) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the `ApiClient`.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::ClientBuild`] error if the HTTP client cannot
    /// be constructed (for example when the TLS backend fails to initialize).
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let http_client = match self.http_client {
            Some(client) => client,
            None => {
                let mut builder = ReqwestClient::builder();
                if let Some(timeout) = self.config.timeout {
                    builder = builder.timeout(timeout);
                }
                if let Some(connect_timeout) = self.config.connect_timeout {
                    builder = builder.connect_timeout(connect_timeout);
                }
                builder.build().map_err(|e| {
                    ApiError::new(
                        ErrorKind::ClientBuild,
                        "",
                        format!("Failed to build HTTP client: {e}"),
                    )
                    .with_source(e)
                })?
            }
        };

        Ok(ApiClient {
            base_url: self.config.base_url,
            http_client,
            session: self.session.unwrap_or_default(),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
            navigator: self.navigator.unwrap_or_else(|| Arc::new(TracingNavigator)),
        })
    }
}

impl ApiClient {
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Creates a client for `base_url` with default hooks and an in-memory
    /// session.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http_client: ReqwestClient::new(),
            session: SessionState::default(),
            notifier: Arc::new(TracingNotifier),
            navigator: Arc::new(TracingNavigator),
        }
    }

    /// Creates a client configured from the environment.
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::build`].
    pub fn from_env() -> Result<Self, ApiError> {
        Self::builder().config(ClientConfig::from_env()).build()
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Issues one backend call.
    ///
    /// Attaches the session token, shapes the payload, reads the response in
    /// the requested mode and classifies failures. See [`ErrorKind`] for the
    /// failure taxonomy and the side effects each kind triggers.
    ///
    /// # Errors
    ///
    /// Every failure, including in-band stream errors over HTTP 200, is
    /// returned as a classified [`ApiError`]. Nothing is retried.
    pub async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let RequestOptions {
            method,
            body,
            headers,
            response_type,
            mut on_progress,
            cancel,
        } = options;

        let url = construct_url(&self.base_url, endpoint);
        let token = self.session.token();
        let streaming = on_progress.is_some();
        let headers = build_headers(&headers, body.as_ref(), streaming, token.as_deref());

        let request_id = loud_wire::next_request_id();
        let wire_body = match &body {
            Some(RequestBody::Json(value)) => Some(value.to_string()),
            Some(RequestBody::Multipart(_)) => Some("<multipart form>".to_string()),
            None => None,
        };
        let wire_method = if streaming {
            format!("{method} (stream)")
        } else {
            method.to_string()
        };
        loud_wire::log_request(
            request_id,
            &wire_method,
            &url,
            token.is_some(),
            wire_body.as_deref(),
        );
        debug!(
            "{} {} (streaming={}, {:?})",
            method,
            loud_wire::redact_url(endpoint),
            streaming,
            response_type
        );

        let mut builder = self.http_client.request(method, &url).headers(headers);
        builder = match body {
            Some(RequestBody::Json(value)) => builder.body(value.to_string()),
            Some(RequestBody::Multipart(form)) => builder.multipart(form),
            None => builder,
        };

        let response = match cancellable(cancel.as_ref(), builder.send()).await {
            None => return Err(self.fail(endpoint, ErrorKind::Cancelled, None)),
            Some(Err(e)) => return Err(self.fail_transport(endpoint, e)),
            Some(Ok(response)) => response,
        };

        let status = response.status();
        loud_wire::log_response_status(request_id, status.as_u16());
        let response_headers = response.headers().clone();

        let (body, in_band_error) = if let Some(callback) = on_progress.as_mut() {
            let outcome = decode_progress_stream(
                response.bytes_stream(),
                request_id,
                &mut **callback,
                cancel.as_ref(),
            )
            .await;
            match outcome {
                Ok(StreamOutcome { payload, is_error }) => (Body::Json(payload), is_error),
                // An error status with an empty body still classifies by status
                Err(StreamError::Incomplete) if !status.is_success() => {
                    (Body::Json(Value::Object(serde_json::Map::new())), false)
                }
                Err(StreamError::Incomplete) => {
                    return Err(self.fail(endpoint, ErrorKind::StreamIncomplete, None));
                }
                Err(StreamError::Cancelled) => {
                    return Err(self.fail(endpoint, ErrorKind::Cancelled, None));
                }
                Err(StreamError::Transport(e)) => return Err(self.fail_transport(endpoint, e)),
            }
        } else if response_type == ResponseType::Blob {
            match cancellable(cancel.as_ref(), response.bytes()).await {
                None => return Err(self.fail(endpoint, ErrorKind::Cancelled, None)),
                Some(Err(e)) => return Err(self.fail_transport(endpoint, e)),
                Some(Ok(bytes)) => {
                    loud_wire::log_response_blob(
                        request_id,
                        bytes.len(),
                        content_type(&response_headers),
                    );
                    (Body::Blob(bytes), false)
                }
            }
        } else {
            let is_json = content_type(&response_headers)
                .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"));
            let text = match cancellable(cancel.as_ref(), response.text()).await {
                None => return Err(self.fail(endpoint, ErrorKind::Cancelled, None)),
                Some(Err(e)) => return Err(self.fail_transport(endpoint, e)),
                Some(Ok(text)) => text,
            };
            loud_wire::log_response_body(request_id, &text);

            let value = if !is_json {
                wrap_text_body(&text)
            } else if text.trim().is_empty() {
                Value::Null
            } else {
                match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(
                            "Undecodable JSON from {} ({}): {}",
                            endpoint,
                            e,
                            preview(&text)
                        );
                        return Err(self.fail(endpoint, ErrorKind::Unexpected, Some(Box::new(e))));
                    }
                }
            };
            (Body::Json(value), false)
        };

        if !status.is_success() || in_band_error {
            let payload = match &body {
                Body::Json(value) => value.clone(),
                Body::Blob(bytes) => payload_from_bytes(bytes),
            };
            let logging_out = self.session.is_logging_out();
            let classification = if status.is_success() {
                classify_stream_error(&payload, logging_out)
            } else {
                classify_status(status.as_u16(), endpoint, &payload, logging_out)
            };
            if classification.expire_session {
                self.expire_session(endpoint, token.as_deref());
            }
            return Err(self.apply(endpoint, classification, None));
        }

        Ok(match body {
            Body::Json(value) => ApiResponse::Json(value),
            Body::Blob(data) => ApiResponse::Blob(BlobResponse {
                data,
                headers: response_headers,
                status: status.as_u16(),
            }),
        })
    }

    /// GET returning the JSON payload.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get(&self, endpoint: &str) -> Result<Value, ApiError> {
        let response = self.request(endpoint, RequestOptions::get()).await?;
        self.decode(endpoint, response)
    }

    /// POST a JSON body, returning the JSON payload.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post(&self, endpoint: &str, body: Value) -> Result<Value, ApiError> {
        let response = self.request(endpoint, RequestOptions::post().with_json(body)).await?;
        self.decode(endpoint, response)
    }

    /// PUT a JSON body, returning the JSON payload.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn put(&self, endpoint: &str, body: Value) -> Result<Value, ApiError> {
        let response = self.request(endpoint, RequestOptions::put().with_json(body)).await?;
        self.decode(endpoint, response)
    }

    /// PATCH a JSON body, returning the JSON payload.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn patch(&self, endpoint: &str, body: Value) -> Result<Value, ApiError> {
        let response = self.request(endpoint, RequestOptions::patch().with_json(body)).await?;
        self.decode(endpoint, response)
    }

    /// DELETE, returning the JSON payload.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn delete(&self, endpoint: &str) -> Result<Value, ApiError> {
        let response = self.request(endpoint, RequestOptions::delete()).await?;
        self.decode(endpoint, response)
    }

    /// GET deserialized into `T`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request); a payload that does not match `T` is
    /// an [`ErrorKind::Unexpected`] error.
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let response = self.request(endpoint, RequestOptions::get()).await?;
        self.decode(endpoint, response)
    }

    /// POST a serializable body, deserializing the payload into `T`.
    ///
    /// # Errors
    ///
    /// See [`get_json`](Self::get_json). A body that cannot be serialized is
    /// an [`ErrorKind::Unexpected`] error and no request is sent.
    pub async fn post_json<T, B>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)
            .map_err(|e| self.fail(endpoint, ErrorKind::Unexpected, Some(Box::new(e))))?;
        let response = self.request(endpoint, RequestOptions::post().with_json(body)).await?;
        self.decode(endpoint, response)
    }

    /// POST a multipart form (file uploads).
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn upload(&self, endpoint: &str, form: Form) -> Result<Value, ApiError> {
        let response = self.request(endpoint, RequestOptions::post().with_multipart(form)).await?;
        self.decode(endpoint, response)
    }

    /// GET a binary payload together with its headers.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn download(&self, endpoint: &str) -> Result<BlobResponse, ApiError> {
        match self.request(endpoint, RequestOptions::get().blob()).await? {
            ApiResponse::Blob(blob) => Ok(blob),
            ApiResponse::Json(_) => {
                warn!("Expected binary data from {} but received JSON", endpoint);
                Err(self.fail(endpoint, ErrorKind::Unexpected, None))
            }
        }
    }

    /// POST a JSON body and follow the NDJSON progress stream.
    ///
    /// `on_progress` receives each stage's data in order; the final payload
    /// is returned.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use marketplace_client::ApiClient;
    /// use serde_json::json;
    ///
    /// # async fn example() -> Result<(), marketplace_client::ApiError> {
    /// let client = ApiClient::new("http://localhost:5000");
    /// let result = client
    ///     .stream(
    ///         "/api/chat/generate",
    ///         json!({"prompt": "Three taglines for a coffee brand"}),
    ///         |stage| println!("stage: {}", stage["stage"]),
    ///     )
    ///     .await?;
    /// println!("{result}");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn stream(
        &self,
        endpoint: &str,
        body: Value,
        on_progress: impl FnMut(Value) + Send + 'static,
    ) -> Result<Value, ApiError> {
        let options = RequestOptions::post()
            .with_json(body)
            .with_progress(on_progress);
        let response = self.request(endpoint, options).await?;
        self.decode(endpoint, response)
    }

    /// Decodes a successful response as `T`, reporting a mismatch like any
    /// other unexpected failure.
    fn decode<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        response: ApiResponse,
    ) -> Result<T, ApiError> {
        response.json(endpoint).map_err(|e| {
            warn!("Unusable response from {}: {}", endpoint, e);
            self.fail(endpoint, ErrorKind::Unexpected, Some(Box::new(e)))
        })
    }

    /// Classifies a failure with no usable response and runs its side effects.
    fn fail(&self, endpoint: &str, kind: ErrorKind, source: Option<BoxError>) -> ApiError {
        let classification = classify_failure(kind, self.session.is_logging_out());
        self.apply(endpoint, classification, source)
    }

    fn fail_transport(&self, endpoint: &str, error: reqwest::Error) -> ApiError {
        let kind = classify::transport_kind(&error);
        self.fail(endpoint, kind, Some(Box::new(error)))
    }

    /// Carries out a classification and builds the error.
    fn apply(
        &self,
        endpoint: &str,
        classification: Classification,
        source: Option<BoxError>,
    ) -> ApiError {
        if classification.notify {
            self.notifier.error(&classification.message);
        }

        debug!(
            "Request to {} failed: kind={}, status={:?}, silent={}",
            endpoint, classification.kind, classification.status, classification.silent
        );

        let mut error = ApiError::new(classification.kind, endpoint, classification.message);
        if let Some(status) = classification.status {
            error = error.with_status(status);
        }
        if classification.silent {
            error = error.silenced();
        }
        if let Some(source) = source {
            error = error.with_source(source);
        }
        error
    }

    /// Forces re-authentication at most once per session.
    ///
    /// `sent_token` is the token the failed request carried. A 401 for a
    /// token that is no longer stored belongs to an earlier session and
    /// leaves the current one alone.
    fn expire_session(&self, endpoint: &str, sent_token: Option<&str>) {
        if !self.session.holds_token(sent_token) {
            debug!(
                "Stale 401 from {} ignored; the session has changed since it was sent",
                endpoint
            );
            return;
        }
        if !self.session.try_begin_redirect() {
            debug!("Session expiry on {} ignored; redirect already in progress", endpoint);
            return;
        }
        // The token may have been replaced while the guard was being claimed
        if !self.session.holds_token(sent_token) {
            self.session.set_redirecting(false);
            debug!(
                "Stale 401 from {} ignored; the session has changed since it was sent",
                endpoint
            );
            return;
        }

        info!(
            "Session expired (401 from {}); clearing credentials and redirecting to {}",
            endpoint, REDIRECT_PATH
        );
        self.session.clear();
        self.navigator.navigate(REDIRECT_PATH);
    }
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}
