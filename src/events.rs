//! Protocol event decoding and discriminant dispatch types.
//!
//! Agent runs stream a flat sequence of loosely-typed JSON events. Payloads
//! carry arbitrary extra fields, so the decoded form keeps the raw
//! `serde_json::Value` alongside a closed [`EventKind`] tag: known kinds get
//! an exhaustive match in the router, everything else lands in
//! [`EventKind::Unknown`] and is only logged.

use crate::sse::Frame;
use serde_json::{json, Value};

/// Every discriminant the router dispatches on.
///
/// Kept as data so tests can assert that each enumerated discriminant maps to
/// a handled (non-[`EventKind::Unknown`]) kind.
pub const KNOWN_DISCRIMINANTS: &[&str] = &[
    "RUN_STARTED",
    "RUN_ERROR",
    "RUN_FINISHED",
    "TEXT_MESSAGE_START",
    "TEXT_MESSAGE_CONTENT",
    "TEXT_MESSAGE_END",
    "TOOL_CALL_START",
    "TOOL_CALL_ARGS",
    "TOOL_CALL_END",
    "TOOL_CALL_RESULT",
    "CUSTOM",
    "STEP_STARTED",
    "STEP_FINISHED",
];

/// Closed tag over the protocol event variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RunStarted,
    RunError,
    RunFinished,
    TextMessageStart,
    TextMessageContent,
    TextMessageEnd,
    ToolCallStart,
    ToolCallArgs,
    ToolCallEnd,
    ToolCallResult,
    Custom,
    StepStarted,
    StepFinished,
    /// Unrecognized discriminant; logged diagnostically, never dispatched.
    Unknown,
}

impl EventKind {
    /// Map a discriminant string onto the closed tag set.
    pub fn from_discriminant(discriminant: &str) -> Self {
        match discriminant {
            "RUN_STARTED" => Self::RunStarted,
            "RUN_ERROR" => Self::RunError,
            "RUN_FINISHED" => Self::RunFinished,
            "TEXT_MESSAGE_START" => Self::TextMessageStart,
            "TEXT_MESSAGE_CONTENT" => Self::TextMessageContent,
            "TEXT_MESSAGE_END" => Self::TextMessageEnd,
            "TOOL_CALL_START" => Self::ToolCallStart,
            "TOOL_CALL_ARGS" => Self::ToolCallArgs,
            "TOOL_CALL_END" => Self::ToolCallEnd,
            "TOOL_CALL_RESULT" => Self::ToolCallResult,
            "CUSTOM" => Self::Custom,
            "STEP_STARTED" => Self::StepStarted,
            "STEP_FINISHED" => Self::StepFinished,
            _ => Self::Unknown,
        }
    }
}

/// One decoded protocol event: log name, dispatch tag, and raw payload.
#[derive(Debug, Clone)]
pub struct ProtocolEvent {
    /// Display name used in the diagnostic event log: the frame's `event`
    /// field when present, else the payload `type`, else `"(unknown)"`.
    pub name: String,
    /// Dispatch tag resolved from the payload `type` (falling back to the
    /// frame's `event` name when absent).
    pub kind: EventKind,
    /// Decoded JSON payload, or the synthesized fallback for opaque data.
    pub payload: Value,
}

/// Decode a frame's data into a protocol event.
///
/// When the data is absent or not a JSON object, a fallback payload
/// `{type: frame.event, data: raw}` keeps the stream flowing; payload decode
/// failure is never fatal.
pub fn decode_frame(frame: &Frame) -> ProtocolEvent {
    let raw = frame.data.as_deref().unwrap_or("");
    let payload = match serde_json::from_str::<Value>(raw) {
        Ok(value) if value.is_object() => value,
        _ => json!({ "type": frame.event, "data": raw }),
    };

    let payload_type = payload
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);
    let discriminant = payload_type
        .clone()
        .or_else(|| frame.event.clone())
        .unwrap_or_default();
    let name = frame
        .event
        .clone()
        .or(payload_type)
        .unwrap_or_else(|| "(unknown)".to_string());

    ProtocolEvent {
        name,
        kind: EventKind::from_discriminant(&discriminant),
        payload,
    }
}

/// Extract a string field from a payload object.
pub(crate) fn str_field<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(Value::as_str)
}

/// Extract a non-empty string field from a payload object.
pub(crate) fn non_empty_str_field<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    str_field(payload, field).filter(|value| !value.is_empty())
}

/// Pretty-print a JSON value for display surfaces.
pub fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Render a raw payload as display text: strings pass through verbatim,
/// anything else is pretty-printed, null becomes empty.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => pretty(other),
    }
}
