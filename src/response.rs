//! Successful response shapes.

use crate::errors::{ApiError, ErrorKind};
use bytes::Bytes;
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

static FILENAME_EXTENDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)filename\*\s*=\s*(?:[\w-]+'[\w-]*')?([^;]+)").expect("valid filename* pattern")
});

static FILENAME_PLAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).expect("valid filename pattern")
});

/// Binary response body with the headers needed to interpret it.
#[derive(Debug, Clone)]
pub struct BlobResponse {
    pub data: Bytes,
    pub headers: HeaderMap,
    pub status: u16,
}

impl BlobResponse {
    /// File name announced by `Content-Disposition`, if any.
    ///
    /// The RFC 5987 `filename*` form wins over plain `filename`.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        let disposition = self.headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
        filename_from_disposition(disposition)
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }
}

fn filename_from_disposition(disposition: &str) -> Option<String> {
    if let Some(caps) = FILENAME_EXTENDED.captures(disposition) {
        let raw = caps.get(1)?.as_str().trim().trim_matches('"');
        if let Ok(decoded) = urlencoding::decode(raw) {
            return Some(decoded.into_owned());
        }
    }

    let caps = FILENAME_PLAIN.captures(disposition)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
}

/// What a successful [`ApiClient::request`](crate::ApiClient::request) returns.
#[derive(Debug, Clone)]
pub enum ApiResponse {
    Json(Value),
    Blob(BlobResponse),
}

impl ApiResponse {
    /// The JSON payload. Blob responses yield `None`.
    #[must_use]
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Blob(_) => None,
        }
    }

    #[must_use]
    pub fn into_blob(self) -> Option<BlobResponse> {
        match self {
            Self::Blob(blob) => Some(blob),
            Self::Json(_) => None,
        }
    }

    /// Deserializes the JSON payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Unexpected`] error when the response is a blob
    /// or the payload does not match `T`.
    pub fn json<T: DeserializeOwned>(self, endpoint: &str) -> Result<T, ApiError> {
        match self {
            Self::Json(value) => serde_json::from_value(value).map_err(|e| {
                ApiError::new(
                    ErrorKind::Unexpected,
                    endpoint,
                    format!("Response did not match the expected shape: {e}"),
                )
                .with_source(e)
            }),
            Self::Blob(_) => Err(ApiError::new(
                ErrorKind::Unexpected,
                endpoint,
                "Expected a JSON response but received binary data",
            )),
        }
    }
}

/// The backend's conventional success envelope.
///
/// The client does not enforce it; callers that rely on it can deserialize
/// into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// The data of a successful envelope.
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        if self.success { self.data } else { None }
    }
}
