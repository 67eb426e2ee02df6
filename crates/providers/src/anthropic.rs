//! Anthropic Messages API invoker.
//!
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - Policy text sent as the top-level `system` field
//! - One non-streaming call per invocation, bounded by a fixed timeout

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use turnrelay_config::ModelConfig;
use turnrelay_core::error::ModelError;
use turnrelay_core::message::Message;
use turnrelay_core::provider::{ModelInvoker, ModelRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Anthropic native Messages API invoker.
pub struct AnthropicInvoker {
    name: String,
    base_url: String,
    api_key: Option<String>,
    max_tokens: u32,
    timeout: Duration,
    client: reqwest::Client,
}

impl AnthropicInvoker {
    /// Create a new invoker. A `None` key is accepted here and reported on
    /// the first `invoke`.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Build from the `[model]` config section.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(config.api_key.clone())
            .with_base_url(&config.base_url)
            .with_max_tokens(config.max_tokens)
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    /// Use a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Budget for the whole call, connection through body.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn to_api_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .map(|m| AnthropicMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn map_transport_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout {
                after_secs: self.timeout.as_secs().max(1),
            }
        } else {
            ModelError::Network(e.to_string())
        }
    }

    /// The first text block of the reply.
    fn first_text(resp: AnthropicResponse) -> Result<String, ModelError> {
        resp.content
            .into_iter()
            .find_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text),
                ResponseContentBlock::Other => None,
            })
            .ok_or_else(|| ModelError::InvalidResponse("response carried no text block".into()))
    }
}

#[async_trait]
impl ModelInvoker for AnthropicInvoker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: ModelRequest) -> Result<String, ModelError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::NotConfigured("ANTHROPIC_API_KEY not set".into()))?;

        let url = format!("{}/v1/messages", self.base_url);
        let body = AnthropicRequest {
            model: &request.model,
            max_tokens: self.max_tokens,
            system: &request.system,
            messages: Self::to_api_messages(&request.messages),
        };

        debug!(
            invoker = "anthropic",
            model = %request.model,
            messages = body.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Anthropic API error");
            return Err(ModelError::Upstream {
                status_code: status.as_u16(),
                body: error_body,
            });
        }

        let api_resp: AnthropicResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.map_transport_error(e)
            } else {
                ModelError::InvalidResponse(format!("Failed to parse Anthropic response: {e}"))
            }
        })?;

        Self::first_text(api_resp)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}
