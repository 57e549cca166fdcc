//! # toolweave Core
//!
//! Domain types, traits, and error definitions for the toolweave streaming
//! tool-calling engine. This crate carries no HTTP or storage dependencies; it
//! defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of a turn is a trait here:
//! - [`Provider`] produces a fragment stream for one model call
//! - [`Tool`] is a single named capability in the [`ToolRegistry`]
//! - [`ConversationStore`] loads and saves whole conversations
//!
//! Implementations live in their own crates, so the engine can be driven by
//! scripted providers and in-memory stores in tests.

pub mod error;
pub mod ledger;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{LedgerError, ProviderError, StoreError, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageMarker, MessageToolCall, Role};
pub use provider::{
    FinishReason, Provider, ProviderRequest, StreamFragment, ToolCallDelta, ToolDefinition, Usage,
};
pub use store::{ConversationStore, ConversationSummary};
pub use tool::{Tool, ToolCall, ToolOutput, ToolRegistry, ToolResult, ToolStatus};
