//! Client configuration from code or the environment.

use crate::http::common::DEFAULT_BASE_URL;
use std::time::Duration;
use tracing::warn;

/// Environment variable holding the backend base URL.
pub const BASE_URL_ENV: &str = "MARKETPLACE_API_URL";
/// Environment variable holding the total request timeout, in seconds.
pub const TIMEOUT_ENV: &str = "MARKETPLACE_API_TIMEOUT_SECS";
/// Environment variable holding the connect timeout, in seconds.
pub const CONNECT_TIMEOUT_ENV: &str = "MARKETPLACE_API_CONNECT_TIMEOUT_SECS";

/// Connection settings for [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Total request timeout. `None` means no limit, which suits long
    /// generation streams.
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            connect_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Unset or blank variables fall back to the defaults; unparsable
    /// timeouts are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = lookup(BASE_URL_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self {
            base_url,
            timeout: seconds(&lookup, TIMEOUT_ENV),
            connect_timeout: seconds(&lookup, CONNECT_TIMEOUT_ENV),
        }
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}
