//! NDJSON progress stream decoding.
//!
//! A progress stream is a single HTTP response body carrying one JSON value
//! per line:
//!
//! ```text
//! {"type":"stage","data":{"stage":"drafting"}}
//! {"type":"stage","data":{"stage":"rendering"}}
//! {"type":"complete","data":{"imageUrl":"https://..."}}
//! ```
//!
//! Besides `stage` and `complete`, a line may be `{"type":"error","data":...}`
//! (an in-band failure over an otherwise successful response) or a bare value
//! with no `type`, which older endpoints send as their only, final result.
//!
//! Lines are framed on the `\n` byte. A newline inside a JSON string from a
//! misbehaving upstream splits that value; such fragments fail to parse and
//! are dropped like any other malformed line.

use super::error_helpers::preview;
use super::loud_wire;
use async_stream::try_stream;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One decoded line of a progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Intermediate progress; the stream continues.
    Stage(Value),
    /// Final result.
    Complete(Value),
    /// In-band failure; the stream is abandoned.
    Error(Value),
    /// Untagged value, treated as the final result.
    Payload(Value),
}

impl StreamEvent {
    /// Classifies a parsed line. Returns `None` for values that carry no
    /// event (unknown `type` tags, `null`).
    ///
    /// A falsy `type` (`null`, `false`, `0`, `""`) counts as untagged.
    pub fn from_value(value: Value) -> Option<Self> {
        if value.is_null() {
            return None;
        }

        let tag = match value.get("type") {
            None | Some(Value::Null | Value::Bool(false)) => None,
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.as_str()),
            Some(other) => {
                debug!("Ignoring stream line with non-string type: {}", other);
                return None;
            }
        };

        match tag {
            None => Some(Self::Payload(value)),
            Some("stage") => Some(Self::Stage(event_data(&value))),
            Some("complete") => Some(Self::Complete(event_data(&value))),
            Some("error") => Some(Self::Error(event_data(&value))),
            Some(other) => {
                debug!("Ignoring stream line with unknown type '{}'", other);
                None
            }
        }
    }

    /// Whether this event supplies the final payload.
    fn is_terminal(&self) -> bool {
        !matches!(self, Self::Stage(_))
    }
}

/// `data` of a tagged event, or an empty object when absent.
fn event_data(value: &Value) -> Value {
    match value.get("data") {
        Some(data) if !data.is_null() => data.clone(),
        _ => Value::Object(serde_json::Map::new()),
    }
}

/// Errors that end a progress stream without an outcome.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Stream transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Stream ended without a completion payload")]
    Incomplete,
    #[error("Stream was cancelled")]
    Cancelled,
}

/// Final result of a progress stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub payload: Value,
    /// `true` when the payload came from a `type: "error"` line.
    pub is_error: bool,
}

fn parse_line(bytes: &[u8], request_id: usize) -> Option<StreamEvent> {
    let text = String::from_utf8_lossy(bytes);
    let line = text.trim();
    if line.is_empty() {
        return None;
    }

    loud_wire::log_stream_line(request_id, line);

    match serde_json::from_str::<Value>(line) {
        Ok(value) => StreamEvent::from_value(value),
        Err(e) => {
            warn!(
                "Discarding malformed NDJSON line ({}): {}",
                e,
                preview(line)
            );
            None
        }
    }
}

/// Parses an NDJSON byte stream into a stream of [`StreamEvent`]s.
///
/// - Buffers incoming bytes and splits on `\n`
/// - Decodes each line as UTF-8, so characters split across chunks are intact
/// - Skips blank lines, logs and skips malformed ones
/// - Parses an unterminated trailing line when no final payload was seen
pub fn parse_ndjson_stream(
    byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send,
    request_id: usize,
) -> impl Stream<Item = Result<StreamEvent, reqwest::Error>> + Send {
    try_stream! {
        futures_util::pin_mut!(byte_stream);
        let mut buffer = Vec::new();
        let mut saw_terminal = false;

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk: Bytes = chunk_result?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes = buffer.drain(..=newline_pos).collect::<Vec<u8>>();
                if let Some(event) = parse_line(&line_bytes, request_id) {
                    saw_terminal |= event.is_terminal();
                    yield event;
                }
            }
        }

        if !saw_terminal && !buffer.is_empty() {
            if let Some(event) = parse_line(&buffer, request_id) {
                yield event;
            }
        }
    }
}

/// Consumes a progress stream to its outcome.
///
/// `on_progress` receives each stage's data in wire order. Reading stops at
/// the first `error` line; lines after it are never looked at. The
/// cancellation token, if any, is checked before every read.
///
/// # Errors
///
/// - [`StreamError::Transport`] if reading the body fails
/// - [`StreamError::Incomplete`] if the body ends without a final payload
/// - [`StreamError::Cancelled`] if the token fires first
pub async fn decode_progress_stream(
    byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send,
    request_id: usize,
    on_progress: &mut (dyn FnMut(Value) + Send),
    cancel: Option<&CancellationToken>,
) -> Result<StreamOutcome, StreamError> {
    let events = parse_ndjson_stream(byte_stream, request_id);
    futures_util::pin_mut!(events);

    let mut payload = None;
    let mut stages = 0usize;

    loop {
        let next = match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => return Err(StreamError::Cancelled),
                next = events.next() => next,
            },
            None => events.next().await,
        };

        let Some(event) = next else { break };

        match event? {
            StreamEvent::Stage(data) => {
                stages += 1;
                on_progress(data);
            }
            StreamEvent::Complete(data) | StreamEvent::Payload(data) => {
                payload = Some(data);
            }
            StreamEvent::Error(data) => {
                debug!("Progress stream reported an error after {} stages", stages);
                return Ok(StreamOutcome {
                    payload: data,
                    is_error: true,
                });
            }
        }
    }

    debug!("Progress stream finished after {} stages", stages);

    payload
        .map(|payload| StreamOutcome {
            payload,
            is_error: false,
        })
        .ok_or(StreamError::Incomplete)
}
