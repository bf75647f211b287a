//! CLI argument parsing via clap.

use aguichat::build_info;
use clap::Parser;

/// Streaming chat client for AG-UI agent endpoints.
#[derive(Debug, Parser)]
#[command(name = "aguichat", version, long_version = build_info::LONG_VERSION)]
pub struct Args {
    /// Message to send. If omitted, one line is read from stdin.
    pub prompt: Option<String>,

    /// Path to config file (default: ./aguichat.toml or
    /// ~/.config/aguichat/aguichat.toml).
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Override the agent server base URL.
    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Use an explicit thread id instead of the persisted one.
    #[arg(long = "thread", conflicts_with = "new_thread")]
    pub thread: Option<String>,

    /// Start a fresh thread, forgetting the persisted id.
    #[arg(long = "new-thread")]
    pub new_thread: bool,

    /// Dump the diagnostic event log after the run.
    #[arg(long = "show-events")]
    pub show_events: bool,
}
