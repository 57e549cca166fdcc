//! Tool trait — the abstraction over model-invokable capabilities.
//!
//! Tools are looked up by name in the [`ToolRegistry`] when the model asks for
//! them. A tool's failure is data: the engine turns every error into a
//! `status=error` [`ToolResult`] the model can read.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A finalized request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// What a tool returns on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Structured result handed back to the model
    pub payload: serde_json::Value,

    /// One-line summary for humans watching the turn
    pub display_summary: String,
}

impl ToolOutput {
    pub fn new(payload: serde_json::Value, display_summary: impl Into<String>) -> Self {
        Self {
            payload,
            display_summary: display_summary.into(),
        }
    }

    /// Plain text output; the summary is the text itself.
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            display_summary: text.clone(),
            payload: serde_json::Value::String(text),
        }
    }
}

/// The outcome of one tool call, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub tool_call_id: String,

    pub status: ToolStatus,

    pub payload: serde_json::Value,

    pub display_summary: String,
}

impl ToolResult {
    pub fn ok(
        tool_call_id: impl Into<String>,
        payload: serde_json::Value,
        display_summary: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            status: ToolStatus::Ok,
            payload,
            display_summary: display_summary.into(),
        }
    }

    /// An error result; the payload carries the message so the model sees it.
    pub fn error(tool_call_id: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            tool_call_id: tool_call_id.into(),
            status: ToolStatus::Error,
            payload: serde_json::json!({ "error": message }),
            display_summary: format!("Error: {message}"),
        }
    }

    pub fn from_output(tool_call_id: impl Into<String>, output: ToolOutput) -> Self {
        Self::ok(tool_call_id, output.payload, output.display_summary)
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }

    /// Payload rendered as message content: strings verbatim, anything else as JSON.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// The core Tool trait.
///
/// Each capability (wiki lookup, page fetch, ...) implements this trait and is
/// registered in the ToolRegistry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "wiki", "web_url").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A name-keyed registry of available tools.
///
/// Tools are shared behind `Arc` so concurrent calls in one round can hold
/// them without borrowing the registry.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool definitions in name order (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call, returning the tool's own output or error.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolOutput, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.execute(call.arguments.clone()).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
