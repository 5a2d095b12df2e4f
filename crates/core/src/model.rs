//! ModelClient trait — the abstraction over the external model backend.
//!
//! The backend is treated as an opaque remote capability: a client knows
//! how to send one composed prompt and return one validated response.
//! Retry, backoff, and timeout policy live in the gateway crate, not here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A request to the model backend: composed prompt text, model
/// identifier, and sampling options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The composed prompt text
    pub prompt: String,

    /// The model to use (e.g., "gpt-4o", "claude-sonnet-4")
    pub model: String,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ModelRequest {
    /// Create a request with default sampling options.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: None,
            stop: Vec::new(),
        }
    }
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the max token limit
    Length,
    /// Backend reported something else
    Other(String),
}

impl From<&str> for FinishReason {
    fn from(s: &str) -> Self {
        match s {
            "stop" | "end_turn" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A complete, validated response from the model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated text
    pub text: String,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,

    /// Why generation stopped
    pub finish_reason: FinishReason,
}

/// The model backend capability.
///
/// `invoke` is synchronous from the caller's perspective: it returns once
/// the response is fully received and validated, or fails. A response is
/// never partially surfaced.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openai", "mock").
    fn name(&self) -> &str;

    /// Send one request and get one complete response.
    async fn invoke(&self, request: ModelRequest) -> std::result::Result<ModelResponse, ModelError>;
}
