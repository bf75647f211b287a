//! CLI entry point for aguichat.

mod cli;

use aguichat::api::AgentClient;
use aguichat::config::{default_state_dir, load_config};
use aguichat::controller::{RunController, RunStatus};
use aguichat::conversation::{
    generate_id, ChatItem, ChatItemBody, InterruptDescriptor,
};
use aguichat::events::pretty;
use aguichat::thread_state::ThreadStore;
use aguichat::types::{ResumeCommand, ResumeKind};
use clap::Parser;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    // Diagnostics go to stderr so piped output stays clean.
    let filter = EnvFilter::try_from_env("AGUICHAT_LOG").unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    if let Some(base_url) = &args.base_url {
        config.api.base_url = base_url.clone();
    }

    let thread_store = config
        .state_dir
        .clone()
        .or_else(default_state_dir)
        .and_then(|dir| match ThreadStore::open(dir) {
            Ok(store) => Some(store),
            Err(e) => {
                eprintln!("warning: {e}");
                None
            }
        });

    if args.new_thread {
        if let Some(store) = &thread_store {
            if let Err(e) = store.clear() {
                eprintln!("warning: {e}");
            }
        }
    }

    let thread_id = args
        .thread
        .clone()
        .or_else(|| {
            if args.new_thread {
                None
            } else {
                thread_store.as_ref().and_then(ThreadStore::current)
            }
        })
        .unwrap_or_else(|| generate_id("thread"));

    let client = Arc::new(AgentClient::new(&config.api));
    let mut controller = RunController::new(client, thread_id);

    let prompt = match args.prompt.clone() {
        Some(prompt) => prompt,
        None => read_stdin_line("message> ").await.unwrap_or_default(),
    };
    if prompt.trim().is_empty() {
        eprintln!("error: nothing to send");
        std::process::exit(2);
    }

    let run = controller.send_message(prompt).await;
    execute_run(&mut controller, run, 0).await;
    persist_thread(&controller, thread_store.as_ref()).await;

    // Offer resume replies while runs keep pausing on new interrupts.
    let mut handled_interrupt: Option<String> = None;
    loop {
        let conversation = controller.conversation().await;
        let Some(interrupt) = conversation.active_interrupt() else {
            break;
        };
        if handled_interrupt.as_deref() == Some(interrupt.id.as_str()) {
            break;
        }
        handled_interrupt = Some(interrupt.id.clone());

        let ChatItemBody::Interrupt { descriptor } = &interrupt.body else {
            break;
        };
        let Some(command) = prompt_resume_command(descriptor).await else {
            break;
        };

        let already_rendered = conversation.items().len();
        let run = controller.resume(command).await;
        execute_run(&mut controller, run, already_rendered).await;
        persist_thread(&controller, thread_store.as_ref()).await;
    }

    if args.show_events {
        dump_event_log(&controller).await;
    }

    let session = controller.session().await;
    if session.status == RunStatus::Error {
        eprintln!(
            "error: {}",
            session.error.as_deref().unwrap_or("run failed")
        );
        std::process::exit(1);
    }
}

/// Await one run, cancelling it on Ctrl-C, then print what it produced.
async fn execute_run(
    controller: &mut RunController,
    run: tokio::task::JoinHandle<()>,
    already_rendered: usize,
) {
    let mut run = run;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            controller.cancel();
            let _ = run.await;
        }
        result = &mut run => {
            if let Err(e) = result {
                eprintln!("warning: run task failed: {e}");
            }
        }
    }

    let conversation = controller.conversation().await;
    for item in conversation.items().iter().skip(already_rendered) {
        render_item(item);
    }
}

/// Persist the session's (possibly server-assigned) thread id.
async fn persist_thread(controller: &RunController, store: Option<&ThreadStore>) {
    let Some(store) = store else {
        return;
    };
    let session = controller.session().await;
    if let Err(e) = store.save(&session.thread_id) {
        eprintln!("warning: {e}");
    }
}

fn render_item(item: &ChatItem) {
    match &item.body {
        ChatItemBody::User { text } => println!("you> {text}"),
        ChatItemBody::Assistant { text } => println!("assistant> {text}"),
        ChatItemBody::ToolCall {
            tool_call_id,
            tool_name,
            args_text,
        } => {
            let name = tool_name.as_deref().unwrap_or("(unnamed)");
            println!("tool_call [{tool_call_id}] {name}({args_text})");
        }
        ChatItemBody::ToolResult { tool_call_id, text } => {
            println!("tool_result [{tool_call_id}] {text}");
        }
        ChatItemBody::Interrupt { descriptor } => {
            println!(
                "interrupt> {}",
                descriptor
                    .description
                    .as_deref()
                    .unwrap_or("Agent requested confirmation.")
            );
            if let Some(request) = &descriptor.action_request {
                println!("  action: {}", request.action.as_deref().unwrap_or(""));
                if let Some(argv) = &request.args {
                    println!("  args: {}", pretty(argv));
                }
            }
        }
        ChatItemBody::System { text } => {
            let title = item.title.as_deref().unwrap_or("system");
            if text.is_empty() {
                eprintln!("[{title}]");
            } else {
                eprintln!("[{title}] {text}");
            }
        }
    }
}

/// Ask the caller how to reply to an interrupt. Returns `None` to stop.
async fn prompt_resume_command(descriptor: &InterruptDescriptor) -> Option<ResumeCommand> {
    let config = descriptor.config.clone().unwrap_or_default();
    let mut options = Vec::new();
    if config.allow_accept != Some(false) {
        options.push("accept");
    }
    if config.allow_edit != Some(false) {
        options.push("edit <action> [args-json]");
    }
    if config.allow_ignore != Some(false) {
        options.push("ignore");
    }
    if config.allow_respond != Some(false) {
        options.push("respond <text>");
    }
    options.push("quit");

    let line = read_stdin_line(&format!("resume ({})> ", options.join(" | "))).await?;
    resume_command_for_reply(&line, descriptor)
}

/// Translate one typed reply line into a resume command, honoring the
/// descriptor's permission flags. Returns `None` for `quit`, denied kinds,
/// and replies that do not parse.
fn resume_command_for_reply(
    line: &str,
    descriptor: &InterruptDescriptor,
) -> Option<ResumeCommand> {
    let config = descriptor.config.clone().unwrap_or_default();
    let line = line.trim();

    if line == "accept" && config.allow_accept != Some(false) {
        let request = descriptor.action_request.clone().unwrap_or_default();
        return Some(ResumeCommand::new(
            ResumeKind::Accept,
            json!({
                "action": request.action,
                "args": request.args,
            }),
        ));
    }
    if line == "ignore" && config.allow_ignore != Some(false) {
        return Some(ResumeCommand::new(ResumeKind::Ignore, Value::Null));
    }
    if let Some(rest) = line.strip_prefix("edit ") {
        if config.allow_edit == Some(false) {
            return None;
        }
        let rest = rest.trim();
        let (action, args_text) = match rest.split_once(char::is_whitespace) {
            Some((action, args)) => (action, args.trim()),
            None => (rest, ""),
        };
        if action.is_empty() {
            return None;
        }
        // Omitted args keep the requested action's original arguments.
        let args = if args_text.is_empty() {
            descriptor
                .action_request
                .as_ref()
                .and_then(|request| request.args.clone())
                .unwrap_or(Value::Null)
        } else {
            serde_json::from_str(args_text).ok()?
        };
        return Some(ResumeCommand::new(
            ResumeKind::Edit,
            json!({ "action": action, "args": args }),
        ));
    }
    if let Some(text) = line.strip_prefix("respond ") {
        let text = text.trim();
        if !text.is_empty() && config.allow_respond != Some(false) {
            return Some(ResumeCommand::new(
                ResumeKind::Response,
                Value::String(text.to_string()),
            ));
        }
    }
    None
}

async fn dump_event_log(controller: &RunController) {
    let conversation = controller.conversation().await;
    for entry in conversation.event_log() {
        eprintln!("{} {} {}", entry.at_millis, entry.event, entry.payload);
    }
}

/// Read one line from stdin after printing `prompt` to stderr.
async fn read_stdin_line(prompt: &str) -> Option<String> {
    eprint!("{prompt}");
    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    match reader.read_line(&mut line).await {
        Ok(0) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        Err(_) => None,
    }
}
