//! Upstream chat-completion client.
//!
//! One client instance is built at startup from process configuration and
//! shared by every relay request. The sampling parameters are pinned here;
//! nothing client-supplied reaches the upstream request except the message
//! sequence itself.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use terra_protocol::{CompletionRequest, Turn};

/// Pinned sampling parameters. These are invariant configuration, not
/// user-settable knobs.
pub const TEMPERATURE: f64 = 0.2;
pub const TOP_P: f64 = 0.7;
pub const MAX_TOKENS: u32 = 1024;

/// Upstream call failures. The API layer collapses all of these into one
/// client-facing shape; the variants exist for logging.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(StatusCode),

    #[error("upstream returned a malformed body: {0}")]
    Malformed(reqwest::Error),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err)
        } else {
            Self::Transport(err)
        }
    }
}

/// Client for the upstream chat-completion endpoint.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl UpstreamClient {
    /// Build the client. `timeout` bounds the whole upstream call so a hung
    /// upstream cannot hold a relay request open indefinitely.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UpstreamError::Transport)?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Forward one message sequence and return the raw completion body.
    ///
    /// Success means HTTP 2xx and a JSON body; the body is not validated
    /// further here, clients extract the reply themselves.
    pub async fn complete(&self, messages: Vec<Turn>) -> Result<Value, UpstreamError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        debug!(
            model = %request.model,
            turns = request.messages.len(),
            "forwarding completion request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(UpstreamError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status));
        }

        Ok(response.json().await?)
    }
}

// Manual Debug: the bearer credential must never reach logs.
impl fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_carries_pinned_parameters() {
        let request = CompletionRequest {
            model: "meta/llama-3.1-405b-instruct".to_string(),
            messages: vec![Turn::user("hi")],
            temperature: TEMPERATURE,
            top_p: TOP_P,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["temperature"], 0.2);
        assert_eq!(value["top_p"], 0.7);
        assert_eq!(value["max_tokens"], 1024);
        assert_eq!(value["stream"], false);
    }

    #[test]
    fn test_debug_redacts_credential() {
        let client = UpstreamClient::new(
            "https://example.invalid/v1/chat/completions",
            "test-model",
            "secret-key",
            Duration::from_secs(5),
        )
        .unwrap();

        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
