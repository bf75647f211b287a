//! Per-kind protocol event dispatch.
//!
//! Each decoded frame is logged diagnostically and then folded into the
//! conversation and run session. Dispatch is an exhaustive match over
//! [`EventKind`]; unrecognized discriminants fall through the default arm
//! with no state change. Nothing here returns an error: a bad payload
//! degrades locally and the frame loop keeps consuming.

use crate::controller::{RunSession, RunStatus};
use crate::conversation::{generate_id, Conversation, InterruptDescriptor, ToolCallPatch};
use crate::events::{decode_frame, non_empty_str_field, str_field, EventKind, ProtocolEvent};
use crate::sse::Frame;
use serde_json::Value;
use tracing::debug;

/// Decode one frame, log it, and apply its effect.
pub fn apply_frame(session: &mut RunSession, conversation: &mut Conversation, frame: &Frame) {
    let event = decode_frame(frame);
    conversation.log_event(&event.name, event.payload.clone());
    apply_event(session, conversation, &event);
}

/// Fold one decoded protocol event into conversation and session state.
pub fn apply_event(session: &mut RunSession, conversation: &mut Conversation, event: &ProtocolEvent) {
    let payload = &event.payload;
    match event.kind {
        EventKind::RunStarted => {
            if let Some(thread_id) = non_empty_str_field(payload, "thread_id") {
                session.thread_id = thread_id.to_string();
            }
            conversation.push_system("RUN_STARTED", Some(payload.clone()));
        }
        EventKind::RunError => {
            session.status = RunStatus::Error;
            session.error = Some(
                str_field(payload, "message")
                    .unwrap_or("Run error")
                    .to_string(),
            );
            conversation.push_system("RUN_ERROR", Some(payload.clone()));
        }
        EventKind::RunFinished => {
            session.status = RunStatus::Finished;
            conversation.push_system("RUN_FINISHED", Some(payload.clone()));
        }
        EventKind::TextMessageStart => {
            let message_id = str_field(payload, "message_id")
                .map(str::to_string)
                .unwrap_or_else(|| generate_id("assistant"));
            conversation.upsert_assistant_text(&message_id, "");
        }
        EventKind::TextMessageContent => {
            if let Some(message_id) = non_empty_str_field(payload, "message_id") {
                let delta = str_field(payload, "delta").unwrap_or_default();
                conversation.upsert_assistant_text(message_id, delta);
            }
        }
        EventKind::TextMessageEnd => {}
        EventKind::ToolCallStart => {
            let tool_call_id = str_field(payload, "tool_call_id")
                .map(str::to_string)
                .unwrap_or_else(|| generate_id("tc"));
            let name = str_field(payload, "tool_call_name").unwrap_or("tool");
            conversation.upsert_tool_call(
                &tool_call_id,
                ToolCallPatch {
                    tool_name: Some(name.to_string()),
                    title: Some(format!("tool_call: {name}")),
                    args_text: Some(String::new()),
                    raw: Some(payload.clone()),
                },
            );
        }
        EventKind::ToolCallArgs => {
            if let Some(tool_call_id) = non_empty_str_field(payload, "tool_call_id") {
                let delta = str_field(payload, "delta").unwrap_or_default();
                conversation.append_tool_args(tool_call_id, delta);
            }
        }
        EventKind::ToolCallEnd => {
            if let Some(tool_call_id) = non_empty_str_field(payload, "tool_call_id") {
                conversation.upsert_tool_call(
                    tool_call_id,
                    ToolCallPatch {
                        raw: Some(payload.clone()),
                        ..ToolCallPatch::default()
                    },
                );
            }
        }
        EventKind::ToolCallResult => {
            let tool_call_id = str_field(payload, "tool_call_id").unwrap_or_default();
            let content = payload.get("content").cloned().unwrap_or_default();
            conversation.push_tool_result(tool_call_id, &content);
        }
        EventKind::Custom => apply_custom_event(conversation, payload),
        EventKind::StepStarted => {
            conversation.push_system("STEP_STARTED", Some(payload.clone()));
        }
        EventKind::StepFinished => {
            conversation.push_system("STEP_FINISHED", Some(payload.clone()));
        }
        EventKind::Unknown => {
            debug!(event = %event.name, "ignoring unrecognized event");
        }
    }
}

/// Handle the overloaded CUSTOM event.
///
/// Events whose name contains "interrupt" (case-insensitive) smuggle an
/// interrupt descriptor in `value`; everything else becomes a system item.
fn apply_custom_event(conversation: &mut Conversation, payload: &Value) {
    let name = str_field(payload, "name").or_else(|| str_field(payload, "event_name"));

    if name.is_some_and(|n| n.to_lowercase().contains("interrupt")) {
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        let (descriptor, parsed) = extract_interrupt(value);
        let title = name.unwrap_or("Interrupt").to_string();
        conversation.push_interrupt(&title, descriptor, Some(parsed));
        return;
    }

    let title = format!("CUSTOM: {}", name.unwrap_or("(unknown)"));
    conversation.push_system(&title, Some(payload.clone()));
}

/// Extract an interrupt descriptor from a CUSTOM event `value`.
///
/// The value may be the descriptor object itself, a one-element sequence
/// wrapping it, or a JSON-encoded string of either form. Anything that still
/// fails to decode falls back to a placeholder descriptor rather than
/// failing the stream. Returns the descriptor plus the decoded value kept as
/// the item's raw payload.
fn extract_interrupt(value: Value) -> (InterruptDescriptor, Value) {
    let parsed = match &value {
        Value::String(text) => serde_json::from_str::<Value>(text).unwrap_or(value.clone()),
        _ => value,
    };

    let first = match &parsed {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    };

    let descriptor = match &first {
        Value::Object(_) => serde_json::from_value::<InterruptDescriptor>(first.clone())
            .unwrap_or_else(|_| InterruptDescriptor::placeholder()),
        _ => InterruptDescriptor::placeholder(),
    };

    (descriptor, parsed)
}
