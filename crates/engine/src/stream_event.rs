//! Caller-facing turn events.
//!
//! `TurnEvent`s are what the gateway forwards over SSE and what the CLI
//! prints. Every turn ends with exactly one `turn_finished` or `turn_error`.

use serde::{Deserialize, Serialize};
use toolweave_core::provider::Usage;
use toolweave_core::tool::ToolStatus;

use crate::loop_runner::TurnPhase;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Model text, in arrival order.
    Content { content: String },

    /// A tool call began executing.
    ToolStarted {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// A tool call produced its result (or was skipped / rejected).
    ToolFinished {
        id: String,
        name: String,
        status: ToolStatus,
        summary: String,
    },

    /// The turn completed or was cancelled, and the ledger was saved.
    TurnFinished {
        conversation_id: String,
        phase: TurnPhase,
        rounds: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// The turn failed.
    TurnError {
        conversation_id: String,
        message: String,
    },
}

impl TurnEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolFinished { .. } => "tool_finished",
            Self::TurnFinished { .. } => "turn_finished",
            Self::TurnError { .. } => "turn_error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TurnFinished { .. } | Self::TurnError { .. })
    }
}
