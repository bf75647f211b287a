//! Wire types for the agent run endpoint.
//!
//! These serialize directly into the JSON body POSTed to the agent: a run
//! request carries the thread/run identifiers, the new user messages, and
//! (for resume runs) the caller's structured reply to an interrupt under
//! `forwarded_props.command.resume`.

use crate::conversation::generate_id;
use serde::Serialize;
use serde_json::{json, Value};

/// One input message included with a run request.
#[derive(Debug, Clone, Serialize)]
pub struct InputMessage {
    /// Stable message identifier.
    pub id: String,
    /// Author role; this client only sends `"user"`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl InputMessage {
    /// Create a user message with a fresh identifier.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: generate_id("msg"),
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The caller's reply kind to an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeKind {
    /// Perform the requested action as-is.
    Accept,
    /// Perform an edited action instead.
    Edit,
    /// Skip the requested action.
    Ignore,
    /// Answer with a free-form follow-up message.
    Response,
}

impl ResumeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Edit => "edit",
            Self::Ignore => "ignore",
            Self::Response => "response",
        }
    }
}

/// One structured resume reply, sent as part of a new run request.
#[derive(Debug, Clone, Serialize)]
pub struct ResumeCommand {
    #[serde(rename = "type")]
    pub kind: ResumeKind,
    pub args: Value,
}

impl ResumeCommand {
    pub fn new(kind: ResumeKind, args: Value) -> Self {
        Self { kind, args }
    }
}

/// JSON body for the streaming agent run request.
#[derive(Debug, Clone, Serialize)]
pub struct RunAgentInput {
    pub thread_id: String,
    pub run_id: String,
    /// Always serialized (as `null`) to match the expected body shape.
    pub parent_run_id: Option<String>,
    pub state: Value,
    pub messages: Vec<InputMessage>,
    pub tools: Vec<Value>,
    pub context: Vec<Value>,
    pub forwarded_props: Value,
}

impl RunAgentInput {
    /// Build a run request carrying new messages.
    pub fn for_messages(thread_id: impl Into<String>, messages: Vec<InputMessage>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: generate_id("run"),
            parent_run_id: None,
            state: json!({}),
            messages,
            tools: Vec::new(),
            context: Vec::new(),
            forwarded_props: json!({}),
        }
    }

    /// Build a resume/continuation request replying to an interrupt.
    pub fn for_resume(thread_id: impl Into<String>, command: ResumeCommand) -> Self {
        let mut input = Self::for_messages(thread_id, Vec::new());
        input.forwarded_props = json!({
            "command": {
                "resume": [command],
            }
        });
        input
    }
}
