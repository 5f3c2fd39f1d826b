//! Transport to the chat relay.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use terra_protocol::{ChatRequest, Turn};

/// Errors surfaced by a relay transport. The conversation store treats all
/// of them the same way; the distinction exists for logs.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Connection, timeout, or body-decode failure.
    #[error("relay transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The relay answered with a non-success status.
    #[error("relay returned status {0}")]
    Status(u16),
}

/// Seam between the conversation store and the relay so tests can script
/// responses without a network.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Forward one message sequence and return the raw upstream completion
    /// body the relay passes through.
    async fn send(&self, messages: &[Turn]) -> Result<serde_json::Value, RelayError>;
}

/// Production transport: `POST {base_url}/proxy`.
#[derive(Debug, Clone)]
pub struct HttpRelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RelayTransport for HttpRelayClient {
    async fn send(&self, messages: &[Turn]) -> Result<serde_json::Value, RelayError> {
        let url = format!("{}/proxy", self.base_url);
        debug!(url = %url, turns = messages.len(), "sending transcript to relay");

        let response = self
            .http
            .post(&url)
            .json(&ChatRequest::new(messages.to_vec()))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}
