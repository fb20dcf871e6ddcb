//! Decoder for `text/event-stream` response bodies.
//!
//! Only `data: <json>` lines are meaningful. Everything else (comments,
//! `event:` lines, blank separators, malformed JSON) is skipped.

use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

const DATA_PREFIX: &[u8] = b"data: ";

struct DecodeState<S> {
    body: Option<Pin<Box<S>>>,
    buf: Vec<u8>,
}

/// Turn a byte stream into the JSON values carried on its `data:` lines.
///
/// Bytes are buffered until a `\n` arrives, so events and multi-byte UTF-8
/// sequences may be split across reads. A trailing `\r` is stripped. When
/// the body ends, a final unterminated line is still decoded. A body error
/// is yielded once, after which the stream ends and the body is dropped.
pub fn decode_sse<S, B, E>(body: S) -> impl Stream<Item = Result<Value, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let state = DecodeState {
        body: Some(Box::pin(body)),
        buf: Vec::new(),
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buf.drain(..=pos).collect();
                if let Some(value) = parse_line(&line) {
                    return Some((Ok(value), state));
                }
                continue;
            }

            let Some(body) = state.body.as_mut() else {
                // Body finished: flush whatever is left, then stop.
                if state.buf.is_empty() {
                    return None;
                }
                let line = std::mem::take(&mut state.buf);
                return parse_line(&line).map(|value| (Ok(value), state));
            };

            match body.next().await {
                Some(Ok(bytes)) => state.buf.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    state.body = None;
                    state.buf.clear();
                    return Some((Err(e), state));
                }
                None => state.body = None,
            }
        }
    })
}

/// Decode one line (with or without its terminator).
fn parse_line(line: &[u8]) -> Option<Value> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        if !line.is_empty() {
            tracing::trace!(line = %String::from_utf8_lossy(line), "Skipping non-data SSE line");
        }
        return None;
    };
    match serde_json::from_slice(data) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::trace!(
                error = %e,
                data = %String::from_utf8_lossy(data),
                "Skipping malformed SSE payload",
            );
            None
        }
    }
}
