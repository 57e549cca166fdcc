//! Ledger operations on a [`Conversation`].
//!
//! The ledger only grows through [`Conversation::append`], which takes the
//! whole batch a turn produced and either applies all of it or none of it.
//! The only other mutations are tail truncation and a full clear.

use chrono::Utc;
use std::collections::HashSet;

use crate::error::LedgerError;
use crate::message::{Conversation, Message, MessageToolCall, Role};

impl Conversation {
    /// Append one turn's messages atomically.
    ///
    /// Every tool message must answer a call of the assistant message directly
    /// before its run of tool messages, at most once per call. Tool call ids
    /// must be unique within the batch. On error the ledger is unchanged.
    pub fn append(&mut self, batch: Vec<Message>) -> Result<(), LedgerError> {
        self.validate_batch(&batch)?;
        if batch.is_empty() {
            return Ok(());
        }
        self.messages.extend(batch);
        self.updated_at = Utc::now();
        Ok(())
    }

    fn validate_batch(&self, batch: &[Message]) -> Result<(), LedgerError> {
        // The open group is the trailing assistant message with calls plus
        // the tool results already answering it.
        let mut open: Option<&[MessageToolCall]> = None;
        let mut answered: HashSet<&str> = HashSet::new();
        if let Some(pos) = self.messages.iter().rposition(|m| m.role != Role::Tool) {
            let head = &self.messages[pos];
            if head.role == Role::Assistant && !head.tool_calls.is_empty() {
                open = Some(head.tool_calls.as_slice());
                answered.extend(self.messages[pos + 1..].iter().filter_map(|m| m.tool_call_id.as_deref()));
            }
        }
        let mut seen_calls = HashSet::new();

        for msg in batch {
            match msg.role {
                Role::Tool => {
                    let id = msg
                        .tool_call_id
                        .as_deref()
                        .ok_or(LedgerError::MissingToolCallId)?;
                    let matched = open.is_some_and(|calls| calls.iter().any(|c| c.id == id));
                    if !matched {
                        return Err(LedgerError::UnmatchedToolResult(id.to_string()));
                    }
                    if !answered.insert(id) {
                        return Err(LedgerError::DuplicateToolResult(id.to_string()));
                    }
                }
                Role::Assistant if !msg.tool_calls.is_empty() => {
                    for call in &msg.tool_calls {
                        if !seen_calls.insert(call.id.as_str()) {
                            return Err(LedgerError::DuplicateToolCallId(call.id.clone()));
                        }
                    }
                    open = Some(msg.tool_calls.as_slice());
                    answered.clear();
                }
                _ => {
                    open = None;
                    answered.clear();
                }
            }
        }
        Ok(())
    }

    /// Remove the last user message and everything after it.
    ///
    /// Returns the removed user message so the exchange can be re-run, or
    /// `None` (leaving the ledger untouched) if there is no user message.
    pub fn truncate_last_exchange(&mut self) -> Option<Message> {
        let pos = self.messages.iter().rposition(|m| m.role == Role::User)?;
        let mut removed = self.messages.split_off(pos);
        self.updated_at = Utc::now();
        Some(removed.swap_remove(0))
    }

    /// An immutable, ordered copy of the ledger.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Drop every message and the title.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.title = None;
        self.updated_at = Utc::now();
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }
}
