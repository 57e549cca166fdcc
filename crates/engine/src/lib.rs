//! # toolweave-engine
//!
//! Streaming tool-call orchestration.
//!
//! One user message starts a turn. The [`TurnLoop`] streams the model's
//! answer, reassembles any tool calls it makes, runs them, feeds the results
//! back and repeats until the model answers without tools, the round budget
//! runs out, the caller interrupts, or the stream fails. [`ChatService`] wraps
//! the loop with persistence, naming and the one-turn-per-conversation lock.

pub mod accumulator;
pub mod interrupt;
pub mod loop_runner;
pub mod naming;
pub mod prompt;
pub mod service;
pub mod stream_event;
pub mod transcript;

#[cfg(test)]
mod test_support;

pub use accumulator::{AccumulatedCall, ToolCallAccumulator};
pub use interrupt::{InterruptController, TurnBusy, TurnGuard};
pub use loop_runner::{TurnInput, TurnLoop, TurnOutcome, TurnPhase};
pub use naming::TitleGenerator;
pub use service::{Attachment, ChatService, ServiceError, TurnHandle, TurnReport};
pub use stream_event::TurnEvent;
pub use transcript::{TranscriptEntry, TranscriptToolResult};
