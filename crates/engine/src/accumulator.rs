//! Reassembles streamed tool call deltas into complete calls.
//!
//! Providers send a tool call as many small deltas tagged with an `index`.
//! Deltas for different indices may interleave. The accumulator merges them
//! per index and, once the stream is done, parses each argument buffer on its
//! own so one malformed call never invalidates its siblings.

use std::collections::BTreeMap;
use toolweave_core::message::MessageToolCall;
use toolweave_core::provider::ToolCallDelta;
use toolweave_core::tool::ToolCall;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Slot {
    id: Option<String>,
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: BTreeMap<u32, Slot>,
}

/// One finalized call, possibly unusable.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedCall {
    pub index: u32,
    pub id: String,
    pub name: String,
    /// Argument text exactly as streamed
    pub raw_arguments: String,
    /// Parsed arguments, or why the call cannot run
    pub parsed: Result<serde_json::Value, String>,
}

impl AccumulatedCall {
    /// The executable call, if the arguments parsed and a name arrived.
    pub fn to_tool_call(&self) -> Option<ToolCall> {
        self.parsed.as_ref().ok().map(|arguments| ToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: arguments.clone(),
        })
    }

    /// The form stored on the assistant message.
    pub fn to_message_call(&self) -> MessageToolCall {
        let arguments = if self.raw_arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            self.raw_arguments.clone()
        };
        MessageToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments,
        }
    }
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one delta. The first non-empty id wins; name and argument
    /// pieces are concatenated in arrival order.
    pub fn push(&mut self, delta: ToolCallDelta) {
        let slot = self.slots.entry(delta.index).or_default();
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            slot.id.get_or_insert(id);
        }
        if let Some(name) = delta.name {
            slot.name.push_str(&name);
        }
        if let Some(arguments) = delta.arguments {
            slot.arguments.push_str(&arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Finalize every call in index order.
    pub fn finish(self) -> Vec<AccumulatedCall> {
        self.slots
            .into_iter()
            .map(|(index, slot)| {
                let id = slot
                    .id
                    .unwrap_or_else(|| format!("call_{index}_{}", Uuid::new_v4().simple()));
                let parsed = if slot.name.trim().is_empty() {
                    Err("tool call has no name".to_string())
                } else {
                    parse_arguments(&slot.arguments)
                };
                AccumulatedCall {
                    index,
                    id,
                    name: slot.name.trim().to_string(),
                    raw_arguments: slot.arguments,
                    parsed,
                }
            })
            .collect()
    }
}

/// An empty buffer means "no arguments".
fn parse_arguments(raw: &str) -> Result<serde_json::Value, String> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON arguments: {e}"))
}
