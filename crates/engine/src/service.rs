//! The chat service: everything around a turn.
//!
//! `ChatService` claims the conversation's turn slot, loads the ledger, runs
//! the [`TurnLoop`] on its own task, then appends the staged messages, names
//! the conversation, saves it and releases the slot. The gateway and the CLI
//! both drive conversations through this type.

use chrono::Local;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolweave_config::AppConfig;
use toolweave_core::error::{LedgerError, StoreError};
use toolweave_core::message::{Conversation, ConversationId, Message};
use toolweave_core::provider::{Provider, ToolDefinition};
use toolweave_core::store::{ConversationStore, ConversationSummary};
use toolweave_core::tool::ToolRegistry;
use tracing::{error, info};

use crate::interrupt::{InterruptController, TurnBusy, TurnGuard};
use crate::loop_runner::{TurnInput, TurnLoop, TurnOutcome, TurnPhase};
use crate::naming::TitleGenerator;
use crate::prompt::{DEFAULT_SYSTEM_PROMPT, attachment_note, render_system_prompt};
use crate::stream_event::TurnEvent;
use crate::transcript::{TranscriptEntry, transcript};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Busy(#[from] TurnBusy),

    #[error("Conversation not found: {0}")]
    NotFound(ConversationId),

    #[error("Nothing to regenerate in conversation {0}")]
    NothingToRegenerate(ConversationId),

    #[error("Nothing to delete in conversation {0}")]
    NothingToDelete(ConversationId),

    #[error("Message must not be empty")]
    EmptyMessage,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// A file sent along with a user message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub content: String,
}

/// A running turn.
pub struct TurnHandle {
    pub conversation_id: ConversationId,
    /// Closed once the turn's terminal event has been sent
    pub events: mpsc::UnboundedReceiver<TurnEvent>,
    pub completion: JoinHandle<TurnReport>,
}

/// How a turn ended, after persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub conversation_id: ConversationId,
    pub phase: TurnPhase,
    pub rounds: u32,
    pub title: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ConversationStore>,
    turn_loop: Arc<TurnLoop>,
    naming: Option<Arc<TitleGenerator>>,
    interrupts: InterruptController,
    system_prompt: Arc<str>,
}

impl ChatService {
    pub fn new(store: Arc<dyn ConversationStore>, turn_loop: TurnLoop) -> Self {
        Self {
            store,
            turn_loop: Arc::new(turn_loop),
            naming: None,
            interrupts: InterruptController::new(),
            system_prompt: Arc::from(DEFAULT_SYSTEM_PROMPT),
        }
    }

    /// Wire a service from configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let turn_loop = TurnLoop::from_config(provider.clone(), tools, config);
        let naming = config
            .naming
            .enabled
            .then(|| {
                TitleGenerator::from_config(provider, turn_loop.model(), &config.naming)
                    .with_timeout(config.engine.model_timeout())
            });
        let mut service = Self::new(store, turn_loop);
        if let Some(naming) = naming {
            service = service.with_naming(naming);
        }
        if let Some(prompt) = &config.identity.system_prompt {
            service = service.with_system_prompt(prompt.clone());
        }
        service
    }

    pub fn with_naming(mut self, naming: TitleGenerator) -> Self {
        self.naming = Some(Arc::new(naming));
        self
    }

    /// Replace the system prompt template (`{current_datetime}` is substituted).
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Arc::from(prompt.into());
        self
    }

    pub fn model(&self) -> &str {
        self.turn_loop.model()
    }

    pub fn provider_name(&self) -> &str {
        self.turn_loop.provider().name()
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.turn_loop.tools().definitions()
    }

    pub fn is_busy(&self, id: &ConversationId) -> bool {
        self.interrupts.is_active(id)
    }

    /// Start a turn for a new user message.
    ///
    /// Without an id a new conversation is created; an unknown id starts a
    /// conversation under that id. Ids the store cannot save are rejected
    /// before any model call.
    pub async fn send_message(
        &self,
        conversation_id: Option<ConversationId>,
        text: &str,
        attachment: Option<Attachment>,
    ) -> Result<TurnHandle, ServiceError> {
        if text.trim().is_empty() && attachment.is_none() {
            return Err(ServiceError::EmptyMessage);
        }
        let id = conversation_id.unwrap_or_default();
        self.store.validate_id(&id)?;
        let guard = self.interrupts.begin(&id)?;
        let conversation = self
            .store
            .load(&id)
            .await?
            .unwrap_or_else(|| Conversation::with_id(id.clone()));

        let mut opening = Vec::with_capacity(2);
        if let Some(file) = attachment {
            opening.push(Message::system(attachment_note(&file.name, &file.content, text)));
        }
        opening.push(Message::user(text));

        Ok(self.spawn_turn(guard, conversation, opening))
    }

    /// Drop the last exchange and answer the same user message again.
    pub async fn regenerate(&self, id: &ConversationId) -> Result<TurnHandle, ServiceError> {
        let guard = self.interrupts.begin(id)?;
        let mut conversation = self.load_existing(id).await?;
        let user = conversation
            .truncate_last_exchange()
            .ok_or_else(|| ServiceError::NothingToRegenerate(id.clone()))?;
        self.store.save(&conversation).await?;
        info!(conversation_id = %id, "Regenerating last exchange");

        Ok(self.spawn_turn(guard, conversation, vec![user]))
    }

    /// Remove the last user message and everything after it.
    pub async fn delete_last(&self, id: &ConversationId) -> Result<Conversation, ServiceError> {
        let _guard = self.interrupts.begin(id)?;
        let mut conversation = self.load_existing(id).await?;
        conversation
            .truncate_last_exchange()
            .ok_or_else(|| ServiceError::NothingToDelete(id.clone()))?;
        self.store.save(&conversation).await?;
        Ok(conversation)
    }

    /// Signal the conversation's active turn. Returns whether one was running.
    pub fn interrupt(&self, id: &ConversationId) -> bool {
        self.interrupts.interrupt(id)
    }

    pub async fn new_conversation(&self) -> Result<Conversation, ServiceError> {
        let conversation = Conversation::new();
        self.store.save(&conversation).await?;
        Ok(conversation)
    }

    pub async fn list(&self) -> Result<Vec<ConversationSummary>, ServiceError> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, id: &ConversationId) -> Result<Conversation, ServiceError> {
        self.load_existing(id).await
    }

    pub async fn transcript(&self, id: &ConversationId) -> Result<Vec<TranscriptEntry>, ServiceError> {
        Ok(transcript(&self.load_existing(id).await?))
    }

    pub async fn delete(&self, id: &ConversationId) -> Result<(), ServiceError> {
        let _guard = self.interrupts.begin(id)?;
        if self.store.delete(id).await? {
            info!(conversation_id = %id, "Conversation deleted");
            Ok(())
        } else {
            Err(ServiceError::NotFound(id.clone()))
        }
    }

    async fn load_existing(&self, id: &ConversationId) -> Result<Conversation, ServiceError> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))
    }

    fn spawn_turn(&self, guard: TurnGuard, conversation: Conversation, opening: Vec<Message>) -> TurnHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let conversation_id = conversation.id.clone();
        let completion = tokio::spawn(self.clone().run_turn(guard, conversation, opening, tx));
        TurnHandle {
            conversation_id,
            events: rx,
            completion,
        }
    }

    async fn run_turn(
        self,
        guard: TurnGuard,
        mut conversation: Conversation,
        opening: Vec<Message>,
        events: mpsc::UnboundedSender<TurnEvent>,
    ) -> TurnReport {
        let conversation_id = conversation.id.clone();
        let input = TurnInput {
            conversation_id: conversation_id.clone(),
            history: conversation.snapshot(),
            preamble: vec![Message::system(render_system_prompt(
                &self.system_prompt,
                Local::now(),
            ))],
            opening,
        };

        let outcome = self.turn_loop.run(input, guard.token(), &events).await;
        let persisted = self.persist(&mut conversation, &outcome, guard.token()).await;
        drop(guard);

        let mut report = TurnReport {
            conversation_id: conversation_id.clone(),
            phase: outcome.phase,
            rounds: outcome.rounds,
            title: conversation.title.clone(),
            error: outcome.error.clone(),
        };

        let terminal = match persisted {
            Err(e) => {
                error!(conversation_id = %conversation_id, error = %e, "Failed to persist turn");
                report.phase = TurnPhase::Failed;
                report.error = Some(e.to_string());
                TurnEvent::TurnError {
                    conversation_id: conversation_id.to_string(),
                    message: e.to_string(),
                }
            }
            Ok(()) if outcome.phase == TurnPhase::Failed => TurnEvent::TurnError {
                conversation_id: conversation_id.to_string(),
                message: outcome.error.unwrap_or_else(|| "turn failed".into()),
            },
            Ok(()) => TurnEvent::TurnFinished {
                conversation_id: conversation_id.to_string(),
                phase: outcome.phase,
                rounds: outcome.rounds,
                title: conversation.title.clone(),
                usage: outcome.usage,
            },
        };
        let _ = events.send(terminal);
        report
    }

    /// Append the turn's messages, name the conversation and save it.
    ///
    /// Naming runs under the turn's token, so an interrupt also ends a
    /// pending title request.
    async fn persist(
        &self,
        conversation: &mut Conversation,
        outcome: &TurnOutcome,
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        conversation.append(outcome.messages.clone())?;
        if outcome.phase == TurnPhase::Completed {
            if let Some(naming) = &self.naming {
                naming.ensure_title(conversation, cancel).await;
            }
        }
        self.store.save(conversation).await?;
        Ok(())
    }
}
