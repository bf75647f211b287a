//! Run lifecycle control: one in-flight run, cancellation, supersession.
//!
//! [`RunController`] owns the single-slot cancellation token and the shared
//! conversation/session state. Each run executes on a spawned reader task
//! that checks the token before every network read; starting a new run fires
//! the previous token and bumps a generation counter so a superseded reader
//! stops applying mutations the moment it loses ownership.

use crate::api::{AgentTransport, EventSource};
use crate::conversation::{generate_id, Conversation};
use crate::error::ApiError;
use crate::router;
use crate::sse::{Frame, SseDecoder};
use crate::types::{InputMessage, ResumeCommand, RunAgentInput};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

/// Lifecycle status of the current run.
///
/// Transitions are monotone within one run: idle/connecting -> streaming ->
/// finished|error, or back to idle on cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Connecting,
    Streaming,
    Finished,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }
}

/// Identity and status of the in-flight (or last) run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSession {
    /// Thread identifier; may be replaced by RUN_STARTED's `thread_id`.
    pub thread_id: String,
    /// Run identifier of the most recently issued request.
    pub run_id: Option<String>,
    pub status: RunStatus,
    /// Error message when status is [`RunStatus::Error`].
    pub error: Option<String>,
}

impl RunSession {
    fn new(thread_id: String) -> Self {
        Self {
            thread_id,
            run_id: None,
            status: RunStatus::Idle,
            error: None,
        }
    }
}

/// State shared between the controller and its reader tasks.
struct ControllerState {
    /// Ownership counter; a reader only mutates while its generation is
    /// current. Bumped on every run start and thread reset.
    generation: u64,
    session: RunSession,
    conversation: Conversation,
}

/// How one reader loop ended.
enum StreamOutcome {
    /// The stream was fully consumed.
    Completed,
    /// The cancellation token fired.
    Cancelled,
    /// Transport-level failure (connect error, bad status, mid-stream error).
    Failed(ApiError),
}

/// Owns the lifecycle of agent runs against one conversation thread.
pub struct RunController {
    transport: Arc<dyn AgentTransport>,
    state: Arc<Mutex<ControllerState>>,
    /// Single live cancellation slot; replaced atomically on each run start.
    cancel_tx: Option<watch::Sender<bool>>,
}

impl RunController {
    /// Create a controller for `thread_id` over the given transport.
    pub fn new(transport: Arc<dyn AgentTransport>, thread_id: impl Into<String>) -> Self {
        Self {
            transport,
            state: Arc::new(Mutex::new(ControllerState {
                generation: 0,
                session: RunSession::new(thread_id.into()),
                conversation: Conversation::new(),
            })),
            cancel_tx: None,
        }
    }

    /// Snapshot of the current run session.
    pub async fn session(&self) -> RunSession {
        self.state.lock().await.session.clone()
    }

    /// Snapshot of the conversation state.
    pub async fn conversation(&self) -> Conversation {
        self.state.lock().await.conversation.clone()
    }

    /// Append a user message and start a run carrying it.
    pub async fn send_message(&mut self, text: impl Into<String>) -> JoinHandle<()> {
        let text = text.into();
        let thread_id = {
            let mut state = self.state.lock().await;
            state.conversation.push_user(text.clone());
            state.session.thread_id.clone()
        };
        let input = RunAgentInput::for_messages(thread_id, vec![InputMessage::user(text)]);
        self.start_run(input).await
    }

    /// Reply to the active interrupt and start the continuation run.
    pub async fn resume(&mut self, command: ResumeCommand) -> JoinHandle<()> {
        let thread_id = {
            let mut state = self.state.lock().await;
            let title = format!("resume: {}", command.kind.as_str());
            let raw = serde_json::to_value(&command).ok();
            state.conversation.push_system(&title, raw);
            state.session.thread_id.clone()
        };
        let input = RunAgentInput::for_resume(thread_id, command);
        self.start_run(input).await
    }

    /// Fire the live cancellation token, if any.
    ///
    /// The superseded reader observes the token before its next read, stops
    /// applying mutations, resets status to idle, and records an `aborted`
    /// system item. Cancellation is not an error, and a run that already
    /// reached a terminal status keeps it.
    pub fn cancel(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(true);
        }
    }

    /// Abandon the current thread: cancel any run, clear all conversation
    /// state, and adopt a fresh thread id. Returns the new id.
    pub async fn new_thread(&mut self) -> String {
        self.cancel();
        let thread_id = generate_id("thread");
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.session = RunSession::new(thread_id.clone());
        state.conversation.reset();
        thread_id
    }

    /// Supersede any prior run and spawn the reader loop for `input`.
    async fn start_run(&mut self, input: RunAgentInput) -> JoinHandle<()> {
        // Fire the previous run's token before issuing the new request.
        self.cancel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancel_tx = Some(cancel_tx);

        let generation = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            state.session.run_id = Some(input.run_id.clone());
            state.session.status = RunStatus::Connecting;
            state.session.error = None;
            state.generation
        };

        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            run_stream(transport, state, generation, input, cancel_rx).await;
        })
    }
}

/// Execute one run: request, frame loop, and terminal status transition.
async fn run_stream(
    transport: Arc<dyn AgentTransport>,
    state: Arc<Mutex<ControllerState>>,
    generation: u64,
    input: RunAgentInput,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let outcome = drive_stream(
        transport.as_ref(),
        &state,
        generation,
        &input,
        &mut cancel_rx,
    )
    .await;

    let mut state = state.lock().await;
    if state.generation != generation {
        // Superseded: a newer run owns the session now.
        return;
    }
    match outcome {
        StreamOutcome::Completed => {
            // RUN_ERROR already moved the session to its terminal state.
            if state.session.status != RunStatus::Error {
                state.session.status = RunStatus::Finished;
            }
        }
        StreamOutcome::Cancelled => {
            // A cancel that lands after a terminal event (RUN_FINISHED or
            // RUN_ERROR already applied, stream still open) changes nothing.
            if !matches!(
                state.session.status,
                RunStatus::Finished | RunStatus::Error
            ) {
                debug!(run_id = ?state.session.run_id, "run cancelled");
                state.session.status = RunStatus::Idle;
                state.conversation.push_system("aborted", None);
            }
        }
        StreamOutcome::Failed(err) => {
            let message = err.to_string();
            state.session.status = RunStatus::Error;
            state.session.error = Some(message.clone());
            state
                .conversation
                .push_system("stream error", Some(Value::String(message)));
        }
    }
}

/// Issue the request and consume the stream frame by frame.
///
/// The cancellation token is checked before every read; an interrupted
/// decode leaves already-applied conversation state untouched beyond the
/// frames validly emitted before the token fired.
async fn drive_stream(
    transport: &dyn AgentTransport,
    state: &Arc<Mutex<ControllerState>>,
    generation: u64,
    input: &RunAgentInput,
    cancel_rx: &mut watch::Receiver<bool>,
) -> StreamOutcome {
    let started = tokio::select! {
        _ = wait_for_cancellation(cancel_rx) => return StreamOutcome::Cancelled,
        started = transport.start_run(input) => started,
    };
    let mut source = match started {
        Ok(source) => source,
        Err(err) => return StreamOutcome::Failed(err),
    };

    let mut decoder = SseDecoder::new();
    loop {
        if *cancel_rx.borrow() {
            return StreamOutcome::Cancelled;
        }
        let chunk = tokio::select! {
            _ = wait_for_cancellation(cancel_rx) => return StreamOutcome::Cancelled,
            chunk = source.next_chunk() => match chunk {
                Ok(chunk) => chunk,
                Err(err) => return StreamOutcome::Failed(err),
            },
        };
        let Some(chunk) = chunk else {
            break;
        };
        if !apply_frames(state, generation, cancel_rx, decoder.feed(&chunk)).await {
            return StreamOutcome::Cancelled;
        }
    }

    // Flush a final frame that never received its closing blank line.
    let trailing: Vec<Frame> = decoder.finish().into_iter().collect();
    if !apply_frames(state, generation, cancel_rx, trailing).await {
        return StreamOutcome::Cancelled;
    }
    StreamOutcome::Completed
}

/// Apply decoded frames while this reader still owns the session.
///
/// Returns false when the run has been cancelled or superseded.
async fn apply_frames(
    state: &Arc<Mutex<ControllerState>>,
    generation: u64,
    cancel_rx: &watch::Receiver<bool>,
    frames: Vec<Frame>,
) -> bool {
    if frames.is_empty() {
        return true;
    }
    let mut state = state.lock().await;
    if state.generation != generation || *cancel_rx.borrow() {
        return false;
    }
    for frame in &frames {
        // First decoded frame marks the transition out of connecting.
        if state.session.status == RunStatus::Connecting {
            state.session.status = RunStatus::Streaming;
        }
        let ControllerState {
            session,
            conversation,
            ..
        } = &mut *state;
        router::apply_frame(session, conversation, frame);
    }
    true
}

async fn wait_for_cancellation(cancel_rx: &mut watch::Receiver<bool>) {
    if *cancel_rx.borrow() {
        return;
    }
    let _ = cancel_rx.changed().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ChatItemBody;
    use crate::testsupport::{sse_event_block, ScriptedTransport};
    use serde_json::json;

    fn run_blocks() -> String {
        format!(
            "{}{}{}{}{}",
            sse_event_block("message", r#"{"type":"RUN_STARTED","thread_id":"srv-1"}"#),
            sse_event_block("message", r#"{"type":"TEXT_MESSAGE_START","message_id":"m1"}"#),
            sse_event_block(
                "message",
                r#"{"type":"TEXT_MESSAGE_CONTENT","message_id":"m1","delta":"Hi"}"#
            ),
            sse_event_block(
                "message",
                r#"{"type":"TEXT_MESSAGE_CONTENT","message_id":"m1","delta":" there"}"#
            ),
            sse_event_block("message", r#"{"type":"RUN_FINISHED"}"#),
        )
    }

    // Ensures a full run walks idle -> finished and folds streamed text.
    #[tokio::test]
    async fn full_run_reaches_finished_with_assistant_text() {
        let transport = Arc::new(ScriptedTransport::with_stream(&run_blocks()));
        let mut controller = RunController::new(transport, "t-local");
        assert_eq!(controller.session().await.status, RunStatus::Idle);

        let handle = controller.send_message("hello").await;
        handle.await.expect("run task");

        let session = controller.session().await;
        assert_eq!(session.status, RunStatus::Finished);
        assert_eq!(session.thread_id, "srv-1");
        assert!(session.error.is_none());

        let convo = controller.conversation().await;
        assert_eq!(convo.items()[0].kind(), "user");
        let assistant = convo
            .items()
            .iter()
            .find(|item| item.kind() == "assistant")
            .expect("assistant item");
        assert_eq!(
            assistant.body,
            ChatItemBody::Assistant {
                text: "Hi there".to_string()
            }
        );
    }

    // Ensures a RUN_ERROR event is terminal even though the stream completes.
    #[tokio::test]
    async fn run_error_event_is_terminal() {
        let stream = format!(
            "{}{}",
            sse_event_block("message", r#"{"type":"RUN_ERROR","message":"boom"}"#),
            sse_event_block("message", r#"{"type":"STEP_FINISHED"}"#),
        );
        let transport = Arc::new(ScriptedTransport::with_stream(&stream));
        let mut controller = RunController::new(transport, "t-local");
        controller.send_message("hi").await.await.expect("run task");

        let session = controller.session().await;
        assert_eq!(session.status, RunStatus::Error);
        assert_eq!(session.error.as_deref(), Some("boom"));
    }

    // Ensures a non-2xx response surfaces as status=error with the body.
    #[tokio::test]
    async fn transport_failure_sets_error_status() {
        let transport = Arc::new(ScriptedTransport::failing(ApiError::Status(
            500,
            "backend down".to_string(),
        )));
        let mut controller = RunController::new(transport, "t-local");
        controller.send_message("hi").await.await.expect("run task");

        let session = controller.session().await;
        assert_eq!(session.status, RunStatus::Error);
        assert!(session.error.as_deref().unwrap().contains("backend down"));

        let convo = controller.conversation().await;
        let last = convo.items().last().expect("stream error item");
        assert_eq!(last.title.as_deref(), Some("stream error"));
    }

    // Ensures cancellation resets to idle with an `aborted` marker, distinct
    // from error.
    #[tokio::test]
    async fn cancel_resets_to_idle_with_aborted_item() {
        // First chunk streams, then the source blocks until cancelled.
        let transport = Arc::new(ScriptedTransport::with_pending_tail(&sse_event_block(
            "message",
            r#"{"type":"TEXT_MESSAGE_START","message_id":"m1"}"#,
        )));
        let mut controller = RunController::new(transport, "t-local");
        let handle = controller.send_message("hi").await;

        wait_for_status(&controller, RunStatus::Streaming).await;
        controller.cancel();
        handle.await.expect("run task");

        let session = controller.session().await;
        assert_eq!(session.status, RunStatus::Idle);
        assert!(session.error.is_none());
        let convo = controller.conversation().await;
        let last = convo.items().last().expect("aborted item");
        assert_eq!(last.title.as_deref(), Some("aborted"));
    }

    // Ensures a cancel landing after RUN_FINISHED leaves the terminal status
    // in place instead of regressing it to idle.
    #[tokio::test]
    async fn cancel_after_finished_keeps_terminal_status() {
        // RUN_FINISHED is applied, then the source blocks with the stream
        // still open until the cancel arrives.
        let transport = Arc::new(ScriptedTransport::with_pending_tail(&sse_event_block(
            "message",
            r#"{"type":"RUN_FINISHED"}"#,
        )));
        let mut controller = RunController::new(transport, "t-local");
        let handle = controller.send_message("hi").await;

        wait_for_status(&controller, RunStatus::Finished).await;
        controller.cancel();
        handle.await.expect("run task");

        let session = controller.session().await;
        assert_eq!(session.status, RunStatus::Finished);
        let convo = controller.conversation().await;
        assert!(convo
            .items()
            .iter()
            .all(|item| item.title.as_deref() != Some("aborted")));
    }

    // Ensures a new run supersedes the prior one: the old reader stops
    // applying mutations and the new run starts from connecting.
    #[tokio::test]
    async fn new_run_supersedes_streaming_run() {
        let first_stream = sse_event_block(
            "message",
            r#"{"type":"TEXT_MESSAGE_START","message_id":"old"}"#,
        );
        let transport = Arc::new(ScriptedTransport::with_runs(vec![
            ScriptedTransport::pending_tail_run(&first_stream),
            ScriptedTransport::stream_run(&run_blocks()),
        ]));
        let mut controller = RunController::new(Arc::clone(&transport) as _, "t-local");

        let first = controller.send_message("first").await;
        wait_for_status(&controller, RunStatus::Streaming).await;
        let items_before = controller.conversation().await.items().len();

        let second = controller.send_message("second").await;
        first.await.expect("superseded task");
        second.await.expect("second task");

        let session = controller.session().await;
        assert_eq!(session.status, RunStatus::Finished);

        // The superseded reader must not have appended an `aborted` marker or
        // anything else after losing ownership, beyond the new run's items.
        let convo = controller.conversation().await;
        assert!(convo
            .items()
            .iter()
            .all(|item| item.title.as_deref() != Some("aborted")));
        assert!(convo.items().len() > items_before);
    }

    // Ensures resume requests carry the command and log a system marker.
    #[tokio::test]
    async fn resume_sends_forwarded_command() {
        let transport = Arc::new(ScriptedTransport::with_stream(&sse_event_block(
            "message",
            r#"{"type":"RUN_FINISHED"}"#,
        )));
        let mut controller = RunController::new(Arc::clone(&transport) as _, "t-local");
        let command = ResumeCommand::new(crate::types::ResumeKind::Accept, json!({"a": 1}));
        controller.resume(command).await.await.expect("run task");

        let inputs = transport.recorded_inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(
            inputs[0]["forwarded_props"]["command"]["resume"][0]["type"],
            "accept"
        );
        assert!(inputs[0]["messages"].as_array().unwrap().is_empty());

        let convo = controller.conversation().await;
        assert_eq!(convo.items()[0].title.as_deref(), Some("resume: accept"));
    }

    // Ensures new_thread clears state and adopts a fresh id.
    #[tokio::test]
    async fn new_thread_resets_everything() {
        let transport = Arc::new(ScriptedTransport::with_stream(&run_blocks()));
        let mut controller = RunController::new(transport, "t-local");
        controller.send_message("hi").await.await.expect("run task");
        assert!(!controller.conversation().await.items().is_empty());

        let thread_id = controller.new_thread().await;
        assert!(thread_id.starts_with("thread_"));
        let session = controller.session().await;
        assert_eq!(session.status, RunStatus::Idle);
        assert_eq!(session.thread_id, thread_id);
        assert!(controller.conversation().await.items().is_empty());
    }

    /// Poll until the controller reaches `status` (bounded by test timeout).
    async fn wait_for_status(controller: &RunController, status: RunStatus) {
        for _ in 0..200 {
            if controller.session().await.status == status {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        panic!("controller never reached {status:?}");
    }
}
