//! aguichat — a streaming client for AG-UI agent runs.
//!
//! This crate consumes a server-sent event transport carrying typed agent
//! run events and folds them into an incrementally updated conversation:
//! streamed text deltas, streamed tool-call arguments, lifecycle markers,
//! and interrupt requests smuggled through CUSTOM events.
//!
//! # Quick start
//!
//! ```no_run
//! use aguichat::api::AgentClient;
//! use aguichat::config::load_config;
//! use aguichat::controller::RunController;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let config = load_config(None).unwrap();
//! let client = Arc::new(AgentClient::new(&config.api));
//! let mut controller = RunController::new(client, "thread_1");
//! let run = controller.send_message("Hello!").await;
//! run.await.unwrap();
//! for item in controller.conversation().await.items() {
//!     println!("[{}] {:?}", item.kind(), item.title);
//! }
//! # }
//! ```

pub mod api;
pub mod build_info;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod events;
pub mod router;
pub mod sse;
#[cfg(test)]
pub mod testsupport;
pub mod thread_state;
pub mod types;
