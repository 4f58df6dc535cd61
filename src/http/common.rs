//! URL construction and the header names the backend expects.

/// Base URL used when no configuration is supplied.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Header carrying the session token.
///
/// The backend reads this header verbatim; it is not an
/// `Authorization: Bearer` scheme.
pub const AUTH_TOKEN_HEADER: &str = "auth-token";

/// Header asking the backend to emit NDJSON progress events.
pub const STREAM_PROGRESS_HEADER: &str = "x-stream-progress";

/// Content type of a progress stream.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Joins the base URL and an endpoint path with exactly one `/`.
#[must_use]
pub fn construct_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if endpoint.is_empty() {
        base.to_string()
    } else if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}

/// Appends percent-encoded query parameters to an endpoint path.
///
/// # Example
///
/// ```
/// use marketplace_client::with_query;
///
/// let endpoint = with_query("/api/briefs", &[("status", "open"), ("q", "logo & brand")]);
/// assert_eq!(endpoint, "/api/briefs?status=open&q=logo%20%26%20brand");
/// ```
#[must_use]
pub fn with_query(endpoint: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return endpoint.to_string();
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{separator}{query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construct_url_plain() {
        assert_eq!(
            construct_url("http://localhost:5000", "/api/user/login"),
            "http://localhost:5000/api/user/login"
        );
    }

    #[test]
    fn test_construct_url_trailing_slash_on_base() {
        assert_eq!(
            construct_url("https://api.example.com/", "/api/briefs"),
            "https://api.example.com/api/briefs"
        );
    }

    #[test]
    fn test_construct_url_relative_endpoint() {
        assert_eq!(
            construct_url("https://api.example.com", "api/briefs"),
            "https://api.example.com/api/briefs"
        );
    }

    #[test]
    fn test_construct_url_empty_endpoint() {
        assert_eq!(
            construct_url("https://api.example.com/", ""),
            "https://api.example.com"
        );
    }

    #[test]
    fn test_with_query_no_params() {
        assert_eq!(with_query("/api/bids", &[]), "/api/bids");
    }

    #[test]
    fn test_with_query_appends_to_existing_query() {
        assert_eq!(
            with_query("/api/bids?page=2", &[("sort", "price")]),
            "/api/bids?page=2&sort=price"
        );
    }

    #[test]
    fn test_with_query_encodes_special_chars() {
        let url = with_query("/api/search", &[("q", "a+b&c=d")]);
        assert_eq!(url, "/api/search?q=a%2Bb%26c%3Dd");
    }
}
