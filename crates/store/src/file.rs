//! File-based conversation store — one pretty-printed JSON file per conversation.
//!
//! Storage location: `~/.toolweave/conversations/<id>.json` by default.
//!
//! Saves write a sibling temp file and rename it over the target, so a crash
//! mid-write never leaves a half-written conversation behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use toolweave_core::error::StoreError;
use toolweave_core::message::{Conversation, ConversationId};
use toolweave_core::store::{ConversationStore, ConversationSummary};
use tracing::{debug, warn};

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for an ID, or `None` if the ID could escape the directory.
    fn path_for(&self, id: &ConversationId) -> Option<PathBuf> {
        let valid = !id.0.is_empty()
            && id
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.dir.join(format!("{}.json", id.0)))
    }

    async fn read(path: &Path) -> Result<Option<Conversation>, StoreError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                id: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ConversationStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        match self.path_for(id) {
            Some(path) => Self::read(&path).await,
            None => Ok(None),
        }
    }

    /// IDs become file names: ASCII letters, digits, `-` and `_` only.
    fn validate_id(&self, id: &ConversationId) -> Result<(), StoreError> {
        self.path_for(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::InvalidId(id.to_string()))
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let path = self
            .path_for(&conversation.id)
            .ok_or_else(|| StoreError::InvalidId(conversation.id.to_string()))?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Storage(format!("Failed to create conversation directory: {e}"))
        })?;

        let content = serde_json::to_string_pretty(conversation)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize conversation: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write conversation: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace conversation: {e}")))?;

        debug!(id = %conversation.id, messages = conversation.messages.len(), "Conversation saved");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to list conversations: {e}"
                )));
            }
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read(&path).await {
                Ok(Some(conversation)) => summaries.push(ConversationSummary::of(&conversation)),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable conversation"),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, StoreError> {
        let Some(path) = self.path_for(id) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Storage(format!(
                "Failed to delete conversation: {e}"
            ))),
        }
    }
}
