//! Property-based tests for stream decoding and failure classification.
//!
//! The decoder must give the same result however the transport splits the
//! body, including splits inside multibyte characters.

use bytes::Bytes;
use futures_util::stream;
use proptest::prelude::*;
use serde_json::{Value, json};

use super::errors::ErrorKind;
use super::http::classify::{classify_failure, classify_status, is_auth_endpoint};
use super::http::common::construct_url;
use super::http::ndjson::{StreamOutcome, decode_progress_stream};

// =============================================================================
// Strategies
// =============================================================================

/// Stage labels mixing ASCII, accented and wide characters.
fn arb_label() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z ]{0,12}",
        "[àéîõü]{1,6}",
        "[日本語のテキスト]{1,5}",
        "[🎨🖌️✨]{1,4}",
    ]
}

fn arb_endpoint() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("/api/auth/login".to_string()),
        Just("/api/auth/register".to_string()),
        Just("/api/users/change-password".to_string()),
        "/api/[a-z]{1,10}(/[0-9]{1,4})?",
    ]
}

fn ndjson_body(stages: &[String], result: &str) -> Vec<u8> {
    let mut body = String::new();
    for stage in stages {
        body.push_str(&json!({"type": "stage", "data": {"stage": stage}}).to_string());
        body.push('\n');
    }
    body.push_str(&json!({"type": "complete", "data": {"result": result}}).to_string());
    body.push('\n');
    body.into_bytes()
}

/// Splits `body` at the given positions (taken modulo its length).
fn split_at_points(body: &[u8], points: &[usize]) -> Vec<Bytes> {
    let mut cuts: Vec<usize> = points
        .iter()
        .map(|p| p % (body.len() + 1))
        .collect();
    cuts.push(0);
    cuts.push(body.len());
    cuts.sort_unstable();
    cuts.dedup();

    cuts.windows(2)
        .map(|w| Bytes::copy_from_slice(&body[w[0]..w[1]]))
        .collect()
}

fn decode_chunks(chunks: Vec<Bytes>) -> (StreamOutcome, Vec<Value>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let byte_stream = stream::iter(chunks.into_iter().map(Ok::<Bytes, reqwest::Error>));
        let mut seen = Vec::new();
        let mut on_progress = |data: Value| seen.push(data);
        let outcome = decode_progress_stream(byte_stream, 0, &mut on_progress, None)
            .await
            .unwrap();
        (outcome, seen)
    })
}

// =============================================================================
// Stream decoding
// =============================================================================

proptest! {
    #[test]
    fn decoding_is_independent_of_chunking(
        stages in prop::collection::vec(arb_label(), 0..6),
        result in arb_label(),
        points in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let body = ndjson_body(&stages, &result);
        let (outcome, seen) = decode_chunks(split_at_points(&body, &points));

        let expected: Vec<Value> = stages.iter().map(|s| json!({"stage": s})).collect();
        prop_assert_eq!(seen, expected);
        prop_assert_eq!(outcome.payload, json!({"result": result}));
        prop_assert!(!outcome.is_error);
    }

    #[test]
    fn single_byte_chunks_decode_like_one_chunk(
        stages in prop::collection::vec(arb_label(), 1..4),
        result in arb_label(),
    ) {
        let body = ndjson_body(&stages, &result);
        let whole = decode_chunks(vec![Bytes::from(body.clone())]);
        let bytewise = decode_chunks(body.iter().map(|b| Bytes::copy_from_slice(&[*b])).collect());
        prop_assert_eq!(whole, bytewise);
    }
}

// =============================================================================
// Classification
// =============================================================================

proptest! {
    #[test]
    fn logout_never_notifies_or_redirects(
        status in 400u16..600,
        endpoint in arb_endpoint(),
        message in proptest::option::of("[a-zA-Z ]{0,20}"),
    ) {
        let payload = message.map_or(json!({}), |m| json!({"message": m}));
        let c = classify_status(status, &endpoint, &payload, true);
        prop_assert!(!c.notify);
        prop_assert!(!c.expire_session);
        prop_assert_eq!(c.status, Some(status));
    }

    #[test]
    fn only_non_auth_401_expires_session(
        status in 400u16..600,
        endpoint in arb_endpoint(),
    ) {
        let c = classify_status(status, &endpoint, &json!({}), false);
        prop_assert_eq!(c.expire_session, status == 401 && !is_auth_endpoint(&endpoint));
        if c.expire_session {
            prop_assert_eq!(c.kind, ErrorKind::Unauthenticated);
            prop_assert!(!c.notify);
        }
    }

    #[test]
    fn failures_without_response_never_expire_session(logging_out in any::<bool>()) {
        for kind in [
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::StreamIncomplete,
            ErrorKind::Cancelled,
            ErrorKind::Unexpected,
        ] {
            let c = classify_failure(kind, logging_out);
            prop_assert!(!c.expire_session);
            prop_assert_eq!(c.status, None);
        }
    }

    #[test]
    fn construct_url_joins_with_one_slash(
        base in "https?://[a-z]{1,8}(:[0-9]{2,4})?/{0,3}",
        path in "/?[a-z]{1,8}(/[a-z0-9]{1,6}){0,3}",
    ) {
        let url = construct_url(&base, &path);
        let trimmed = base.trim_end_matches('/');
        prop_assert!(url.starts_with(trimmed));
        let rest = &url[trimmed.len()..];
        prop_assert!(rest.starts_with('/'));
        prop_assert!(!rest.starts_with("//"));
        prop_assert!(url.ends_with(path.trim_start_matches('/')));
    }
}
