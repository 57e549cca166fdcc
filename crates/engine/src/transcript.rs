//! A display-oriented view of a conversation.
//!
//! User and assistant messages become entries; tool results are folded into
//! the assistant entry that requested them. System messages are left out.

use serde::Serialize;
use toolweave_core::message::{Conversation, MessageMarker, Role};
use toolweave_core::tool::ToolStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEntry {
    pub is_user: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<TranscriptToolResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<MessageMarker>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptToolResult {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub status: Option<ToolStatus>,
    pub summary: Option<String>,
    pub content: serde_json::Value,
}

pub fn transcript(conversation: &Conversation) -> Vec<TranscriptEntry> {
    let mut entries: Vec<TranscriptEntry> = Vec::new();
    let mut open_calls = Vec::new();

    for msg in &conversation.messages {
        match msg.role {
            Role::User => entries.push(TranscriptEntry {
                is_user: true,
                content: msg.content.clone(),
                tool_results: Vec::new(),
                marker: None,
            }),
            Role::Assistant => {
                if !msg.tool_calls.is_empty() {
                    open_calls = msg.tool_calls.clone();
                }
                entries.push(TranscriptEntry {
                    is_user: false,
                    content: msg.content.clone(),
                    tool_results: Vec::new(),
                    marker: msg.marker,
                });
            }
            Role::Tool => {
                let Some(entry) = entries.last_mut().filter(|e| !e.is_user) else {
                    continue;
                };
                let Some(call) = open_calls
                    .iter()
                    .find(|c| Some(c.id.as_str()) == msg.tool_call_id.as_deref())
                else {
                    continue;
                };
                entry.tool_results.push(TranscriptToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: serde_json::from_str(&call.arguments)
                        .unwrap_or_else(|_| serde_json::Value::String(call.arguments.clone())),
                    status: msg.tool_status,
                    summary: msg.summary.clone(),
                    content: serde_json::from_str(&msg.content)
                        .unwrap_or_else(|_| serde_json::Value::String(msg.content.clone())),
                });
            }
            Role::System => {}
        }
    }
    entries
}
