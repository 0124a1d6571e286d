//! Server-sent-event assembly for streamed chat completions.
//!
//! The upstream sends newline-delimited `data: {...}` events, each carrying a
//! small content delta, and ends with `data: [DONE]`. [`StreamAssembler`]
//! folds them into one [`ChatCompletionResponse`].
//!
//! Lines are split on raw bytes before UTF-8 decoding, so a multi-byte
//! character cut across two network chunks is decoded intact. Lines whose JSON
//! does not parse are skipped and counted; keep-alives and comments are
//! expected on these streams.

use futures_util::{Stream, StreamExt};
use serde_json::{json, Map, Value};

use crate::models::{validate_completion, ChatCompletionResponse, SchemaError};

/// SSE field prefix carrying event data
const DATA_PREFIX: &str = "data:";

/// Literal payload that marks the end of the stream
const DONE_MARKER: &str = "[DONE]";

/// Per-stream state. Content fragments are only ever appended; metadata is
/// overwritten by whichever event carried it last.
#[derive(Debug, Default, Clone)]
pub struct StreamAccumulator {
    fragments: Vec<String>,
    id: Option<Value>,
    model: Option<Value>,
    created: Option<Value>,
    usage: Option<Value>,
    citations: Option<Value>,
    events: usize,
    skipped_lines: usize,
}

impl StreamAccumulator {
    fn absorb(&mut self, event: &Value) {
        self.events += 1;

        for (key, slot) in [
            ("id", &mut self.id),
            ("model", &mut self.model),
            ("created", &mut self.created),
            ("usage", &mut self.usage),
            ("citations", &mut self.citations),
        ] {
            if let Some(value) = event.get(key).filter(|v| !v.is_null()) {
                *slot = Some(value.clone());
            }
        }

        if let Some(fragment) = event
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            self.fragments.push(fragment.to_string());
        }
    }

    /// Concatenated content so far
    pub fn content(&self) -> String {
        self.fragments.concat()
    }

    /// Number of events parsed
    pub fn events(&self) -> usize {
        self.events
    }

    /// Number of `data:` lines dropped because they were not valid JSON
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    fn into_completion(self) -> Value {
        let mut body = Map::new();
        for (key, value) in [
            ("id", self.id),
            ("model", self.model),
            ("created", self.created),
            ("citations", self.citations),
            ("usage", self.usage),
        ] {
            if let Some(value) = value {
                body.insert(key.to_string(), value);
            }
        }

        body.insert(
            "choices".to_string(),
            json!([{
                "index": 0,
                "message": { "role": "assistant", "content": self.fragments.concat() },
                "finish_reason": "stop"
            }]),
        );

        Value::Object(body)
    }
}

/// Incremental SSE line splitter feeding a [`StreamAccumulator`]
#[derive(Debug, Default)]
pub struct StreamAssembler {
    pending: Vec<u8>,
    accumulator: StreamAccumulator,
}

impl StreamAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk. Only complete lines are parsed; the tail is
    /// kept for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.pending[start..end]).into_owned();
            self.process_line(&line);
            start = end + 1;
        }
        self.pending.drain(..start);
    }

    fn process_line(&mut self, line: &str) {
        let line = line.trim();
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };

        let payload = payload.trim_start();
        if payload == DONE_MARKER {
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(event) => self.accumulator.absorb(&event),
            Err(e) => {
                self.accumulator.skipped_lines += 1;
                tracing::trace!("Skipping unparsable stream line: {}", e);
            }
        }
    }

    /// State accumulated so far
    pub fn accumulator(&self) -> &StreamAccumulator {
        &self.accumulator
    }

    /// End of stream: parse any unterminated last line, then validate the
    /// assembled completion.
    pub fn finish(mut self) -> Result<ChatCompletionResponse, SchemaError> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.process_line(&tail);
        }

        let accumulator = self.accumulator;
        if accumulator.skipped_lines > 0 {
            tracing::warn!(
                "Stream assembled from {} events, {} unparsable lines skipped",
                accumulator.events,
                accumulator.skipped_lines
            );
        }

        validate_completion(accumulator.into_completion())
    }
}

/// Drain `stream` through a [`StreamAssembler`].
///
/// A read error from the stream aborts assembly and is returned as-is; no
/// partial content escapes.
pub async fn assemble<S, B, E>(mut stream: S) -> Result<ChatCompletionResponse, E>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: From<SchemaError>,
{
    let mut assembler = StreamAssembler::new();
    while let Some(chunk) = stream.next().await {
        assembler.push(chunk?.as_ref());
    }
    Ok(assembler.finish()?)
}
