//! Conversation state: addressable chat items plus a capped diagnostic log.
//!
//! The item list is append/patch-only. Streamed values (assistant text,
//! tool-call arguments) accumulate through upserts keyed by stable protocol
//! identifiers; nothing is ever removed except by an explicit reset when a
//! new thread starts.

use crate::events::display_text;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum retained diagnostic event log entries (FIFO eviction beyond this).
pub const EVENT_LOG_CAP: usize = 200;

// ---------------------------------------------------------------------------
// Interrupts
// ---------------------------------------------------------------------------

/// The action an interrupt asks the caller to confirm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptActionRequest {
    /// Action name the agent wants to perform.
    #[serde(default)]
    pub action: Option<String>,
    /// Action arguments; arbitrary JSON, often an object.
    #[serde(default)]
    pub args: Option<Value>,
}

/// Permission flags controlling which resume replies the caller may send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptConfig {
    #[serde(default)]
    pub allow_accept: Option<bool>,
    #[serde(default)]
    pub allow_ignore: Option<bool>,
    #[serde(default)]
    pub allow_edit: Option<bool>,
    #[serde(default)]
    pub allow_respond: Option<bool>,
}

/// Structured descriptor carried by an interrupt item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptDescriptor {
    /// Human-readable reason the run paused.
    #[serde(default)]
    pub description: Option<String>,
    /// Requested action awaiting confirmation.
    #[serde(default)]
    pub action_request: Option<InterruptActionRequest>,
    /// Permission flags for resume replies.
    #[serde(default)]
    pub config: Option<InterruptConfig>,
}

impl InterruptDescriptor {
    /// Placeholder used when a payload does not decode to a descriptor.
    pub fn placeholder() -> Self {
        Self {
            description: Some("Interrupt".to_string()),
            action_request: None,
            config: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Chat items
// ---------------------------------------------------------------------------

/// Variant-specific data for one conversation item.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatItemBody {
    /// Caller-entered message.
    User { text: String },
    /// Assistant message accumulated from streamed text deltas.
    Assistant { text: String },
    /// Tool invocation accumulated from streamed argument deltas.
    ToolCall {
        tool_call_id: String,
        tool_name: Option<String>,
        args_text: String,
    },
    /// Result of a tool invocation, referencing the originating call.
    ToolResult { tool_call_id: String, text: String },
    /// Run pause awaiting a caller resume reply.
    Interrupt { descriptor: InterruptDescriptor },
    /// Lifecycle/diagnostic marker rendered inline.
    System { text: String },
}

/// One addressable conversation item.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatItem {
    /// Stable identifier; assistant items reuse the protocol message id.
    pub id: String,
    /// Creation timestamp in Unix epoch milliseconds.
    pub created_at_millis: u64,
    /// Optional display title.
    pub title: Option<String>,
    /// Variant data.
    pub body: ChatItemBody,
    /// Raw payload that produced or last patched this item, when available.
    pub raw: Option<Value>,
}

impl ChatItem {
    /// Short kind name used by display surfaces and the event dump.
    pub fn kind(&self) -> &'static str {
        match &self.body {
            ChatItemBody::User { .. } => "user",
            ChatItemBody::Assistant { .. } => "assistant",
            ChatItemBody::ToolCall { .. } => "tool_call",
            ChatItemBody::ToolResult { .. } => "tool_result",
            ChatItemBody::Interrupt { .. } => "interrupt",
            ChatItemBody::System { .. } => "system",
        }
    }
}

/// Partial patch merged into a tool-call item on upsert.
///
/// `None` fields preserve the existing value; present fields override it.
#[derive(Debug, Clone, Default)]
pub struct ToolCallPatch {
    pub tool_name: Option<String>,
    pub title: Option<String>,
    pub args_text: Option<String>,
    pub raw: Option<Value>,
}

// ---------------------------------------------------------------------------
// Diagnostic event log
// ---------------------------------------------------------------------------

/// One diagnostic log entry: every dispatched event lands here verbatim,
/// independent of whether it mutated any conversation item.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntry {
    /// Capture time in Unix epoch milliseconds.
    pub at_millis: u64,
    /// Resolved event name.
    pub event: String,
    /// Decoded payload.
    pub payload: Value,
}

// ---------------------------------------------------------------------------
// Conversation reducer
// ---------------------------------------------------------------------------

/// Ordered conversation items plus the capped diagnostic event log.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    items: Vec<ChatItem>,
    events: VecDeque<EventLogEntry>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// All items in creation order.
    pub fn items(&self) -> &[ChatItem] {
        &self.items
    }

    /// Diagnostic log entries, oldest first.
    pub fn event_log(&self) -> impl Iterator<Item = &EventLogEntry> {
        self.events.iter()
    }

    /// The only interrupt eligible to be resumed: the last one in the list.
    pub fn active_interrupt(&self) -> Option<&ChatItem> {
        self.items
            .iter()
            .rev()
            .find(|item| matches!(item.body, ChatItemBody::Interrupt { .. }))
    }

    /// Append a caller-entered user message.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.items.push(ChatItem {
            id: generate_id("user"),
            created_at_millis: now_unix_millis(),
            title: Some("user".to_string()),
            body: ChatItemBody::User { text: text.into() },
            raw: None,
        });
    }

    /// Append `delta` to the assistant item for `message_id`, creating the
    /// item (seeded with the delta) when absent.
    ///
    /// Deltas concatenate in arrival order, so at most one assistant item
    /// exists per message id and its text is the full streamed message.
    pub fn upsert_assistant_text(&mut self, message_id: &str, delta: &str) {
        let existing = self.items.iter_mut().find(|item| {
            item.id == message_id && matches!(item.body, ChatItemBody::Assistant { .. })
        });
        match existing {
            Some(item) => {
                if let ChatItemBody::Assistant { text } = &mut item.body {
                    text.push_str(delta);
                }
            }
            None => self.items.push(ChatItem {
                id: message_id.to_string(),
                created_at_millis: now_unix_millis(),
                title: Some("assistant".to_string()),
                body: ChatItemBody::Assistant {
                    text: delta.to_string(),
                },
                raw: None,
            }),
        }
    }

    /// Locate-or-append the tool-call item for `tool_call_id`, then merge
    /// `patch` into it.
    pub fn upsert_tool_call(&mut self, tool_call_id: &str, patch: ToolCallPatch) {
        let existing = self.items.iter_mut().find(|item| {
            matches!(&item.body, ChatItemBody::ToolCall { tool_call_id: id, .. } if id == tool_call_id)
        });
        match existing {
            Some(item) => {
                if let Some(title) = patch.title {
                    item.title = Some(title);
                }
                if let Some(raw) = patch.raw {
                    item.raw = Some(raw);
                }
                if let ChatItemBody::ToolCall {
                    tool_name,
                    args_text,
                    ..
                } = &mut item.body
                {
                    if let Some(name) = patch.tool_name {
                        *tool_name = Some(name);
                    }
                    if let Some(args) = patch.args_text {
                        *args_text = args;
                    }
                }
            }
            None => self.items.push(ChatItem {
                id: generate_id("tool_call"),
                created_at_millis: now_unix_millis(),
                title: Some(patch.title.unwrap_or_else(|| "tool_call".to_string())),
                body: ChatItemBody::ToolCall {
                    tool_call_id: tool_call_id.to_string(),
                    tool_name: patch.tool_name,
                    args_text: patch.args_text.unwrap_or_default(),
                },
                raw: patch.raw,
            }),
        }
    }

    /// Append `delta` to the streamed argument text for `tool_call_id`,
    /// creating a nameless tool-call item when none exists yet.
    ///
    /// Argument deltas for an id that never saw its start event are accepted
    /// as-is; upstream ordering is not validated here.
    pub fn append_tool_args(&mut self, tool_call_id: &str, delta: &str) {
        let existing = self.items.iter_mut().find(|item| {
            matches!(&item.body, ChatItemBody::ToolCall { tool_call_id: id, .. } if id == tool_call_id)
        });
        match existing {
            Some(item) => {
                if let ChatItemBody::ToolCall { args_text, .. } = &mut item.body {
                    args_text.push_str(delta);
                }
            }
            None => self.upsert_tool_call(
                tool_call_id,
                ToolCallPatch {
                    args_text: Some(delta.to_string()),
                    ..ToolCallPatch::default()
                },
            ),
        }
    }

    /// Append a tool result referencing the originating tool call.
    pub fn push_tool_result(&mut self, tool_call_id: &str, content: &Value) {
        self.items.push(ChatItem {
            id: generate_id("tool_result"),
            created_at_millis: now_unix_millis(),
            title: Some("tool_result".to_string()),
            body: ChatItemBody::ToolResult {
                tool_call_id: tool_call_id.to_string(),
                text: display_text(content),
            },
            raw: Some(content.clone()),
        });
    }

    /// Append a system/diagnostic marker item.
    pub fn push_system(&mut self, title: &str, raw: Option<Value>) {
        let text = raw.as_ref().map(display_text).unwrap_or_default();
        self.items.push(ChatItem {
            id: generate_id("system"),
            created_at_millis: now_unix_millis(),
            title: Some(title.to_string()),
            body: ChatItemBody::System { text },
            raw,
        });
    }

    /// Append an interrupt item awaiting a caller resume reply.
    pub fn push_interrupt(
        &mut self,
        title: &str,
        descriptor: InterruptDescriptor,
        raw: Option<Value>,
    ) {
        self.items.push(ChatItem {
            id: generate_id("interrupt"),
            created_at_millis: now_unix_millis(),
            title: Some(title.to_string()),
            body: ChatItemBody::Interrupt { descriptor },
            raw,
        });
    }

    /// Record one dispatched event in the diagnostic log, evicting the oldest
    /// entry once the cap is exceeded.
    pub fn log_event(&mut self, event: &str, payload: Value) {
        self.events.push_back(EventLogEntry {
            at_millis: now_unix_millis(),
            event: event.to_string(),
            payload,
        });
        while self.events.len() > EVENT_LOG_CAP {
            self.events.pop_front();
        }
    }

    /// Clear items and the diagnostic log (new-thread reset).
    pub fn reset(&mut self) {
        self.items.clear();
        self.events.clear();
    }
}

/// Current Unix timestamp in milliseconds.
pub(crate) fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generate a unique-ish prefixed hex id (`prefix_xxxxxxxxxxxxxxxx`).
pub fn generate_id(prefix: &str) -> String {
    let mut bytes = [0u8; 8];
    // OS RNG is sufficient for low-collision opaque IDs.
    OsRng.fill_bytes(&mut bytes);
    format!("{prefix}_{:016x}", u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Ensures deltas concatenate in arrival order (non-commutative).
    #[test]
    fn assistant_deltas_concatenate_in_order() {
        let mut convo = Conversation::new();
        convo.upsert_assistant_text("m1", "Hel");
        convo.upsert_assistant_text("m1", "lo");
        let assistants: Vec<_> = convo
            .items()
            .iter()
            .filter(|item| item.kind() == "assistant")
            .collect();
        assert_eq!(assistants.len(), 1);
        assert_eq!(
            assistants[0].body,
            ChatItemBody::Assistant {
                text: "Hello".to_string()
            }
        );

        let mut reversed = Conversation::new();
        reversed.upsert_assistant_text("m1", "lo");
        reversed.upsert_assistant_text("m1", "Hel");
        assert_eq!(
            reversed.items()[0].body,
            ChatItemBody::Assistant {
                text: "loHel".to_string()
            }
        );
    }

    // Ensures interleaved tool-arg deltas accumulate independently per id.
    #[test]
    fn interleaved_tool_args_accumulate_per_id() {
        let mut convo = Conversation::new();
        convo.append_tool_args("a", "{\"x\":");
        convo.append_tool_args("b", "[1,");
        convo.append_tool_args("a", "1}");
        convo.append_tool_args("b", "2]");

        let args_for = |convo: &Conversation, wanted: &str| {
            convo
                .items()
                .iter()
                .find_map(|item| match &item.body {
                    ChatItemBody::ToolCall {
                        tool_call_id,
                        args_text,
                        ..
                    } if tool_call_id == wanted => Some(args_text.clone()),
                    _ => None,
                })
                .expect("tool call present")
        };
        assert_eq!(args_for(&convo, "a"), "{\"x\":1}");
        assert_eq!(args_for(&convo, "b"), "[1,2]");
    }

    // Ensures patch merge overrides present fields and preserves absent ones.
    #[test]
    fn tool_call_patch_preserves_absent_fields() {
        let mut convo = Conversation::new();
        convo.upsert_tool_call(
            "tc1",
            ToolCallPatch {
                tool_name: Some("search".to_string()),
                title: Some("tool_call: search".to_string()),
                args_text: Some(String::new()),
                raw: None,
            },
        );
        convo.upsert_tool_call(
            "tc1",
            ToolCallPatch {
                raw: Some(json!({"done": true})),
                ..ToolCallPatch::default()
            },
        );

        let item = &convo.items()[0];
        assert_eq!(item.title.as_deref(), Some("tool_call: search"));
        assert_eq!(item.raw, Some(json!({"done": true})));
        match &item.body {
            ChatItemBody::ToolCall {
                tool_name,
                args_text,
                ..
            } => {
                assert_eq!(tool_name.as_deref(), Some("search"));
                assert_eq!(args_text, "");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    // Ensures the diagnostic log caps at 200 entries with FIFO eviction.
    #[test]
    fn event_log_caps_at_200_entries() {
        let mut convo = Conversation::new();
        for n in 0..(EVENT_LOG_CAP + 1) {
            convo.log_event("EVT", json!({ "n": n }));
        }
        let entries: Vec<_> = convo.event_log().collect();
        assert_eq!(entries.len(), EVENT_LOG_CAP);
        assert_eq!(entries.first().unwrap().payload, json!({"n": 1}));
        assert_eq!(
            entries.last().unwrap().payload,
            json!({"n": EVENT_LOG_CAP})
        );
    }

    // Ensures the active interrupt is the last interrupt item in the list.
    #[test]
    fn active_interrupt_is_last() {
        let mut convo = Conversation::new();
        convo.push_interrupt("first", InterruptDescriptor::placeholder(), None);
        convo.push_system("RUN_FINISHED", None);
        let mut second = InterruptDescriptor::placeholder();
        second.description = Some("confirm delete".to_string());
        convo.push_interrupt("second", second.clone(), None);

        let active = convo.active_interrupt().expect("interrupt present");
        assert_eq!(active.title.as_deref(), Some("second"));
        assert_eq!(
            active.body,
            ChatItemBody::Interrupt { descriptor: second }
        );
    }

    // Ensures tool results render text content verbatim and objects pretty.
    #[test]
    fn tool_result_rendering_follows_content_shape() {
        let mut convo = Conversation::new();
        convo.push_tool_result("tc1", &Value::String("plain output".to_string()));
        convo.push_tool_result("tc1", &json!({"rows": 3}));

        let texts: Vec<_> = convo
            .items()
            .iter()
            .filter_map(|item| match &item.body {
                ChatItemBody::ToolResult { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts[0], "plain output");
        assert!(texts[1].contains("\"rows\": 3"));
    }

    // Ensures reset clears both the items and the diagnostic log.
    #[test]
    fn reset_clears_items_and_log() {
        let mut convo = Conversation::new();
        convo.push_user("hello");
        convo.log_event("RUN_STARTED", json!({}));
        convo.reset();
        assert!(convo.items().is_empty());
        assert_eq!(convo.event_log().count(), 0);
    }

    // Ensures generated ids keep the documented prefixed-hex shape.
    #[test]
    fn generated_ids_are_prefixed_hex() {
        let id = generate_id("tool_call");
        let suffix = id.strip_prefix("tool_call_").expect("prefix");
        assert_eq!(suffix.len(), 16);
        assert!(suffix.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_ne!(generate_id("tool_call"), id);
    }
}
