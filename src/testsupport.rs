//! Shared test fixtures for decoder/router/controller test modules.
//!
//! Keeping tiny but reusable helpers here prevents each test module from
//! rebuilding ad-hoc SSE fixtures and scripted transports.

use crate::api::{AgentTransport, EventSource};
use crate::error::ApiError;
use crate::types::RunAgentInput;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Build one SSE event block with `event:` and `data:` lines.
pub fn sse_event_block(event: &str, data: &str) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

/// Chunk size used when scripting streams, deliberately small and odd so
/// chunk boundaries land mid-line and mid-frame.
const SCRIPT_CHUNK_BYTES: usize = 7;

/// One scripted agent run: either a canned byte stream or a start failure.
pub struct ScriptedRun {
    chunks: Vec<Vec<u8>>,
    /// When set, the source blocks forever after its chunks instead of
    /// signalling end-of-stream (for cancellation tests).
    pending_tail: bool,
    error: Option<ApiError>,
}

/// Deterministic [`AgentTransport`] yielding pre-scripted event streams and
/// recording every request body it receives.
pub struct ScriptedTransport {
    runs: Mutex<VecDeque<ScriptedRun>>,
    inputs: Mutex<Vec<Value>>,
}

impl ScriptedTransport {
    /// Transport with an explicit sequence of scripted runs.
    pub fn with_runs(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: Mutex::new(runs.into()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Single run streaming `stream` and then ending cleanly.
    pub fn with_stream(stream: &str) -> Self {
        Self::with_runs(vec![Self::stream_run(stream)])
    }

    /// Single run streaming `stream` and then blocking until cancelled.
    pub fn with_pending_tail(stream: &str) -> Self {
        Self::with_runs(vec![Self::pending_tail_run(stream)])
    }

    /// Single run whose request fails outright.
    pub fn failing(error: ApiError) -> Self {
        Self::with_runs(vec![ScriptedRun {
            chunks: Vec::new(),
            pending_tail: false,
            error: Some(error),
        }])
    }

    /// Scripted run that streams `stream` in small chunks, then EOF.
    pub fn stream_run(stream: &str) -> ScriptedRun {
        ScriptedRun {
            chunks: chunked(stream),
            pending_tail: false,
            error: None,
        }
    }

    /// Scripted run that streams `stream`, then blocks forever.
    pub fn pending_tail_run(stream: &str) -> ScriptedRun {
        ScriptedRun {
            chunks: chunked(stream),
            pending_tail: true,
            error: None,
        }
    }

    /// Request bodies received so far, as JSON values.
    pub fn recorded_inputs(&self) -> Vec<Value> {
        self.inputs.lock().expect("inputs lock").clone()
    }
}

#[async_trait]
impl AgentTransport for ScriptedTransport {
    async fn start_run(&self, input: &RunAgentInput) -> Result<Box<dyn EventSource>, ApiError> {
        let recorded = serde_json::to_value(input).expect("serializable input");
        self.inputs.lock().expect("inputs lock").push(recorded);

        let run = self
            .runs
            .lock()
            .expect("runs lock")
            .pop_front()
            .unwrap_or_else(|| ScriptedRun {
                chunks: Vec::new(),
                pending_tail: false,
                error: Some(ApiError::Status(599, "no scripted run left".to_string())),
            });
        if let Some(error) = run.error {
            return Err(error);
        }
        Ok(Box::new(ScriptedSource {
            chunks: run.chunks.into(),
            pending_tail: run.pending_tail,
        }))
    }
}

struct ScriptedSource {
    chunks: VecDeque<Vec<u8>>,
    pending_tail: bool,
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(Some(chunk));
        }
        if self.pending_tail {
            // Park until the reader loop is cancelled.
            std::future::pending::<()>().await;
        }
        Ok(None)
    }
}

/// Split a stream into deliberately awkward byte chunks.
fn chunked(stream: &str) -> Vec<Vec<u8>> {
    stream
        .as_bytes()
        .chunks(SCRIPT_CHUNK_BYTES)
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensures the SSE helper emits the expected wire format.
    #[test]
    fn sse_helper_emits_expected_wire_format() {
        let block = sse_event_block("message", r#"{"type":"RUN_FINISHED"}"#);
        assert!(block.starts_with("event: message\n"));
        assert!(block.contains("\ndata: {"));
        assert!(block.ends_with("\n\n"));
    }

    // Ensures scripted chunking covers the whole stream byte-for-byte.
    #[test]
    fn chunked_preserves_all_bytes() {
        let stream = sse_event_block("e", "payload body longer than one chunk");
        let rejoined: Vec<u8> = chunked(&stream).concat();
        assert_eq!(rejoined, stream.as_bytes());
    }
}
