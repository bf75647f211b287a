//! HTTP transport for the streaming agent endpoint.
//!
//! The transport is split behind two small traits so the run controller can
//! be exercised with scripted byte chunks in tests:
//! - [`AgentTransport`] issues one run request and yields an event source
//! - [`EventSource`] hands back the response body one chunk at a time

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::types::RunAgentInput;
use async_trait::async_trait;
use tracing::debug;

/// Chunked byte stream carrying event-stream frames.
#[async_trait]
pub trait EventSource: Send {
    /// Next chunk of response bytes; `None` signals end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError>;
}

/// Issues agent run requests.
///
/// This trait lets tests provide deterministic scripted streams without
/// network calls while the production path uses [`AgentClient`].
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// POST one run request and return the response event stream.
    async fn start_run(&self, input: &RunAgentInput) -> Result<Box<dyn EventSource>, ApiError>;
}

/// Production HTTP client for the agent run endpoint.
pub struct AgentClient {
    http: reqwest::Client,
    endpoint: String,
}

impl AgentClient {
    /// Build a client from resolved API configuration.
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint(),
        }
    }

    /// Resolved agent endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AgentTransport for AgentClient {
    async fn start_run(&self, input: &RunAgentInput) -> Result<Box<dyn EventSource>, ApiError> {
        debug!(endpoint = %self.endpoint, run_id = %input.run_id, "starting agent run");
        let response = self
            .http
            .post(&self.endpoint)
            .header("Accept", "text/event-stream")
            .json(input)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status(status, body));
        }

        Ok(Box::new(HttpEventSource { response }))
    }
}

/// Event source backed by a live reqwest response body.
struct HttpEventSource {
    response: reqwest::Response,
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ApiError> {
        let chunk = self.response.chunk().await?;
        Ok(chunk.map(|bytes| bytes.to_vec()))
    }
}
