//! The model invoker trait, the seam in front of the external LLM API.
//!
//! An invoker performs exactly one synchronous completion per chat
//! invocation and returns the first text output. No streaming, no retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::message::Message;

/// Everything the model receives for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The model identifier (e.g., "claude-sonnet-4-5-20250929")
    pub model: String,

    /// The behavioral policy, sent as the system prompt
    pub system: String,

    /// Assembled conversation, oldest first, ending with the new user message
    pub messages: Vec<Message>,
}

/// The core invoker trait.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// A human-readable name for this invoker (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send the request and return the model's raw text reply.
    async fn invoke(&self, request: ModelRequest) -> std::result::Result<String, ModelError>;
}
