//! Per-conversation interrupt flags and the single-active-turn lock.
//!
//! Starting a turn installs a fresh [`CancellationToken`] for the
//! conversation; a second `begin` for the same conversation fails until the
//! first turn's [`TurnGuard`] is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use toolweave_core::message::ConversationId;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Conversation {0} already has an active turn")]
pub struct TurnBusy(pub ConversationId);

struct ActiveTurn {
    turn: u64,
    token: CancellationToken,
}

#[derive(Clone, Default)]
pub struct InterruptController {
    active: Arc<Mutex<HashMap<ConversationId, ActiveTurn>>>,
    next_turn: Arc<AtomicU64>,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationId, ActiveTurn>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the conversation for a new turn.
    pub fn begin(&self, conversation_id: &ConversationId) -> Result<TurnGuard, TurnBusy> {
        let mut active = self.lock();
        if active.contains_key(conversation_id) {
            return Err(TurnBusy(conversation_id.clone()));
        }
        let turn = self.next_turn.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        active.insert(
            conversation_id.clone(),
            ActiveTurn {
                turn,
                token: token.clone(),
            },
        );
        debug!(conversation_id = %conversation_id, turn, "Turn started");
        Ok(TurnGuard {
            controller: self.clone(),
            conversation_id: conversation_id.clone(),
            turn,
            token,
        })
    }

    /// Signal the active turn, if any. Returns whether a turn was signalled.
    pub fn interrupt(&self, conversation_id: &ConversationId) -> bool {
        match self.lock().get(conversation_id) {
            Some(active) => {
                active.token.cancel();
                debug!(conversation_id = %conversation_id, turn = active.turn, "Turn interrupted");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, conversation_id: &ConversationId) -> bool {
        self.lock().contains_key(conversation_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, conversation_id: &ConversationId, turn: u64) {
        let mut active = self.lock();
        if active.get(conversation_id).is_some_and(|a| a.turn == turn) {
            active.remove(conversation_id);
        }
    }
}

/// Holds the conversation's turn slot until dropped.
pub struct TurnGuard {
    controller: InterruptController,
    conversation_id: ConversationId,
    turn: u64,
    token: CancellationToken,
}

impl TurnGuard {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.controller.release(&self.conversation_id, self.turn);
    }
}

impl std::fmt::Debug for TurnGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnGuard")
            .field("conversation_id", &self.conversation_id)
            .field("turn", &self.turn)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
