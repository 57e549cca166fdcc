//! Conversation naming.
//!
//! After the first completed turn the model is asked for a short title. A
//! conversation is named once; later turns leave the title alone.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toolweave_config::NamingConfig;
use toolweave_core::error::ProviderError;
use toolweave_core::message::{Conversation, Message, Role};
use toolweave_core::provider::{Provider, ProviderRequest};
use toolweave_core::store::excerpt;
use tracing::{debug, warn};

const NAMING_PROMPT: &str = "You create concise conversation titles. \
Write a brief, relevant title (at most 25 characters) for the conversation below. \
Reply with the title only, without quotes or extra text.";

const FALLBACK_TITLE: &str = "New Conversation";

/// Messages quoted to the model when asking for a title.
const QUOTED_MESSAGES: usize = 4;

pub struct TitleGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    max_chars: usize,
    timeout: Duration,
}

impl TitleGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_chars: 40,
            timeout: Duration::from_secs(180),
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, model: impl Into<String>, config: &NamingConfig) -> Self {
        Self::new(provider, model).with_max_chars(config.max_chars)
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Upper bound on the title request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Give the conversation a title if it has none yet.
    ///
    /// Returns `true` when a title was set by this call. The request is
    /// abandoned when `cancel` fires or the timeout passes; the fallback
    /// title is used instead.
    pub async fn ensure_title(&self, conversation: &mut Conversation, cancel: &CancellationToken) -> bool {
        if conversation.title.is_some() {
            return false;
        }
        let quoted: Vec<&Message> = conversation
            .messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant) && m.marker.is_none())
            .filter(|m| !m.content.trim().is_empty())
            .take(QUOTED_MESSAGES)
            .collect();
        let has_user = quoted.iter().any(|m| m.role == Role::User);
        let has_assistant = quoted.iter().any(|m| m.role == Role::Assistant);
        if !has_user || !has_assistant {
            return false;
        }

        let transcript = quoted
            .iter()
            .map(|m| {
                let who = if m.role == Role::User { "User" } else { "Assistant" };
                format!("{who}: {}", excerpt(&m.content, 400))
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut request = ProviderRequest::new(
            &self.model,
            vec![Message::system(NAMING_PROMPT), Message::user(transcript)],
        );
        request.temperature = 0.3;
        request.max_tokens = Some(32);

        let call_token = cancel.child_token();
        let reply = tokio::time::timeout(self.timeout, self.provider.complete(request, call_token.clone()))
            .await
            .unwrap_or_else(|_| {
                call_token.cancel();
                Err(ProviderError::Timeout(format!(
                    "title request after {}s",
                    self.timeout.as_secs_f32()
                )))
            });

        let title = match reply {
            Ok(raw) => clean_title(&raw, self.max_chars),
            Err(e) => {
                warn!(conversation_id = %conversation.id, error = %e, "Title generation failed");
                None
            }
        }
        .unwrap_or_else(|| self.fallback(conversation));

        debug!(conversation_id = %conversation.id, %title, "Conversation named");
        conversation.title = Some(title);
        true
    }

    fn fallback(&self, conversation: &Conversation) -> String {
        conversation
            .first_user_text()
            .map(|text| excerpt(text, self.max_chars))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string())
    }
}

/// First meaningful line of a model reply, without quotes or a `Title:` label.
fn clean_title(raw: &str, max_chars: usize) -> Option<String> {
    let visible = raw.rsplit_once("</think>").map_or(raw, |(_, after)| after);
    let line = visible.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Title:")
        .or_else(|| line.strip_prefix("title:"))
        .unwrap_or(line);
    let line = line
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '*' | '`' | '#'))
        .trim_end_matches('.')
        .trim();
    let title: String = line.chars().take(max_chars).collect();
    let title = title.trim_end().to_string();
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use toolweave_core::provider::StreamFragment;

    fn answered() -> Conversation {
        let mut conv = Conversation::new();
        conv.append(vec![
            Message::user("How does ownership work in Rust?"),
            Message::assistant("Every value has a single owner..."),
        ])
        .unwrap();
        conv
    }

    #[tokio::test]
    async fn names_a_conversation_once() {
        let provider = ScriptedProvider::new(vec![
            text_script("\"Rust Ownership Basics\""),
            text_script("Something Else"),
        ]);
        let naming = TitleGenerator::new(provider.clone(), "test-model");
        let mut conv = answered();

        assert!(naming.ensure_title(&mut conv, &CancellationToken::new()).await);
        assert_eq!(conv.title.as_deref(), Some("Rust Ownership Basics"));

        assert!(!naming.ensure_title(&mut conv, &CancellationToken::new()).await);
        assert_eq!(conv.title.as_deref(), Some("Rust Ownership Basics"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn waits_for_an_assistant_answer() {
        let provider = ScriptedProvider::new(vec![text_script("Too Early")]);
        let naming = TitleGenerator::new(provider.clone(), "test-model");
        let mut conv = Conversation::new();
        conv.append(vec![Message::user("hello")]).unwrap();

        assert!(!naming.ensure_title(&mut conv, &CancellationToken::new()).await);
        assert!(conv.title.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_first_user_message() {
        let provider = ScriptedProvider::new(vec![vec![Step::Fragment(StreamFragment::Failed(
            "offline".into(),
        ))]]);
        let naming = TitleGenerator::new(provider, "test-model").with_max_chars(12);
        let mut conv = answered();

        assert!(naming.ensure_title(&mut conv, &CancellationToken::new()).await);
        let title = conv.title.unwrap();
        assert!(title.starts_with("How does"));
        assert!(title.chars().count() <= 15);
    }

    #[tokio::test]
    async fn stalled_title_request_times_out() {
        let provider = ScriptedProvider::new(vec![vec![Step::Pause]]);
        let naming = TitleGenerator::new(provider, "test-model").with_timeout(Duration::from_millis(50));
        let mut conv = answered();

        let named = tokio::time::timeout(
            Duration::from_secs(5),
            naming.ensure_title(&mut conv, &CancellationToken::new()),
        )
        .await
        .unwrap();
        assert!(named);
        assert!(conv.title.unwrap().starts_with("How does"));
    }

    #[tokio::test]
    async fn cancelled_title_request_falls_back() {
        let provider = ScriptedProvider::new(vec![vec![Step::Pause]]);
        let naming = TitleGenerator::new(provider, "test-model");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut conv = answered();

        assert!(naming.ensure_title(&mut conv, &cancel).await);
        assert!(conv.title.unwrap().starts_with("How does"));
    }

    #[test]
    fn cleans_model_replies() {
        assert_eq!(clean_title("  \"Trip to Oslo\"\n", 40).as_deref(), Some("Trip to Oslo"));
        assert_eq!(clean_title("Title: Weather Check.", 40).as_deref(), Some("Weather Check"));
        assert_eq!(
            clean_title("<think>hmm</think>\n\nBudget Planning", 40).as_deref(),
            Some("Budget Planning")
        );
        assert_eq!(clean_title("A very long title indeed", 6).as_deref(), Some("A very"));
        assert_eq!(clean_title("   \n  ", 40), None);
    }
}
