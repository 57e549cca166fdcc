//! Provider trait — the abstraction over model endpoints.
//!
//! A Provider turns one request into a finite sequence of [`StreamFragment`]s.
//! Every sequence ends with exactly one terminal fragment (`Done`, `Cancelled`
//! or `Failed`); transport errors never escape as `Err`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "qwen2.5-7b-instruct", "gpt-4o")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl ProviderRequest {
    /// A streaming request with default sampling settings.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
            tools: Vec::new(),
            stream: true,
            stop: Vec::new(),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Other(String),
}

impl FinishReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" => Self::Stop,
            "tool_calls" | "function_call" => Self::ToolCalls,
            "length" => Self::Length,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Partial tool call data, merged by `index`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One element of a model stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFragment {
    ContentDelta(String),
    ToolCallDelta(ToolCallDelta),
    Done {
        finish_reason: FinishReason,
        usage: Option<Usage>,
    },
    Cancelled,
    Failed(String),
}

impl StreamFragment {
    pub fn done() -> Self {
        Self::Done {
            finish_reason: FinishReason::Stop,
            usage: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Cancelled | Self::Failed(_))
    }
}

/// The core Provider trait.
///
/// Every model backend implements this trait. The engine calls `stream()`
/// without knowing which provider is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "lmstudio", "openai").
    fn name(&self) -> &str;

    /// Start one model call.
    ///
    /// When `cancel` fires the provider stops reading the network and sends
    /// `Cancelled`. Errors are reported as a `Failed` fragment.
    async fn stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StreamFragment>;

    /// Drain a stream into the complete content text.
    ///
    /// Tool call fragments are ignored. `cancel` is handed to the stream, so
    /// callers bound the call by cancelling it.
    async fn complete(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<String, ProviderError> {
        let mut rx = self.stream(request, cancel).await;
        let mut content = String::new();
        while let Some(fragment) = rx.recv().await {
            match fragment {
                StreamFragment::ContentDelta(text) => content.push_str(&text),
                StreamFragment::ToolCallDelta(_) => {}
                StreamFragment::Done { .. } => return Ok(content),
                StreamFragment::Cancelled => return Err(ProviderError::Cancelled),
                StreamFragment::Failed(reason) => {
                    return Err(ProviderError::StreamInterrupted(reason));
                }
            }
        }
        Err(ProviderError::StreamInterrupted(
            "stream ended without completion".into(),
        ))
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
