//! Persistence collaborator — whole-conversation load and save.
//!
//! Stores never see individual messages: the engine mutates a
//! [`Conversation`] in memory and hands the whole object back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::message::{Conversation, ConversationId};

const PREVIEW_CHARS: usize = 80;

/// A listing entry for a stored conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub updated_at: DateTime<Utc>,

    /// Start of the first user message
    pub preview: String,

    pub message_count: usize,
}

impl ConversationSummary {
    pub fn of(conversation: &Conversation) -> Self {
        let preview = conversation
            .first_user_text()
            .map(|text| excerpt(text, PREVIEW_CHARS))
            .unwrap_or_default();
        Self {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            updated_at: conversation.updated_at,
            preview,
            message_count: conversation.messages.len(),
        }
    }
}

/// First `max_chars` characters of the first line, with an ellipsis if cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let cut: String = line.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}

/// The conversation persistence trait.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// A short name for logs (e.g., "file", "memory").
    fn name(&self) -> &str;

    /// Check that conversations under this ID can be saved.
    fn validate_id(&self, _id: &ConversationId) -> Result<(), StoreError> {
        Ok(())
    }

    /// Load a conversation by ID. `Ok(None)` if it does not exist.
    async fn load(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError>;

    /// Replace the stored conversation with this one.
    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError>;

    /// Summaries of all conversations, most recently updated first.
    async fn list(&self) -> Result<Vec<ConversationSummary>, StoreError>;

    /// Delete a conversation. Returns whether it existed.
    async fn delete(&self, id: &ConversationId) -> Result<bool, StoreError>;
}
