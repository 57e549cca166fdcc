//! The turn loop: stream the model, run the tools it asks for, repeat.
//!
//! A turn moves `Idle → Streaming → {ToolExecuting → Streaming}*` and ends in
//! `Completed`, `Cancelled` or `Failed`. Nothing escapes as an error: stream
//! failures, tool errors and interrupts all become staged messages that the
//! caller appends to the ledger as one batch.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use toolweave_config::AppConfig;
use toolweave_core::error::{ProviderError, ToolError};
use toolweave_core::message::{ConversationId, Message, MessageMarker};
use toolweave_core::provider::{Provider, ProviderRequest, StreamFragment, Usage};
use toolweave_core::tool::{ToolCall, ToolRegistry, ToolResult};
use tracing::{debug, info, warn};

use crate::accumulator::{AccumulatedCall, ToolCallAccumulator};
use crate::stream_event::TurnEvent;

/// Result text for calls that never started because the turn was interrupted.
pub const SKIPPED_REASON: &str = "skipped: turn interrupted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    Streaming,
    ToolExecuting,
    Completed,
    Cancelled,
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Everything one turn needs from its caller.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub conversation_id: ConversationId,
    /// Ledger snapshot taken when the turn started
    pub history: Vec<Message>,
    /// Sent ahead of the history on every model call, never staged
    pub preamble: Vec<Message>,
    /// Messages that open the turn (attachment notes, then the user message)
    pub opening: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub phase: TurnPhase,
    /// Everything the turn produced, opening messages first
    pub messages: Vec<Message>,
    /// Model calls made
    pub rounds: u32,
    pub usage: Option<Usage>,
    /// Why the turn failed
    pub error: Option<String>,
}

/// How one model call ended.
enum RoundEnd {
    Finished {
        content: String,
        calls: Vec<AccumulatedCall>,
        usage: Option<Usage>,
    },
    Cancelled {
        content: String,
    },
    Failed {
        content: String,
        reason: String,
    },
}

/// Drives model calls and tool executions for a single turn.
pub struct TurnLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_rounds: u32,
    tool_timeout: Duration,
    model_timeout: Duration,
    tool_concurrency: usize,
}

impl TurnLoop {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, model: impl Into<String>) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_rounds: 8,
            tool_timeout: Duration::from_secs(60),
            model_timeout: Duration::from_secs(180),
            tool_concurrency: 4,
        }
    }

    /// Build a loop from the `[engine]` section and provider defaults.
    pub fn from_config(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        let model = config
            .providers
            .get(&config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| config.default_model.clone());
        Self::new(provider, tools, model)
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens)
            .with_max_rounds(config.engine.max_rounds)
            .with_tool_timeout(config.engine.tool_timeout())
            .with_model_timeout(config.engine.model_timeout())
            .with_tool_concurrency(config.engine.tool_concurrency)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Upper bound on model calls per turn.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max.max(1);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// How many tools of one round may run at the same time.
    pub fn with_tool_concurrency(mut self, n: usize) -> Self {
        self.tool_concurrency = n.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Run one turn to a terminal phase.
    ///
    /// Events are best-effort: a dropped receiver does not stop the turn.
    pub async fn run(
        &self,
        input: TurnInput,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> TurnOutcome {
        let TurnInput {
            conversation_id,
            history,
            preamble,
            opening,
        } = input;
        let definitions = self.tools.definitions();
        let mut staged = opening;
        let mut rounds = 0u32;
        let mut usage: Option<Usage> = None;
        let mut error = None;

        info!(
            conversation_id = %conversation_id,
            model = %self.model,
            provider = self.provider.name(),
            history = history.len(),
            "Turn started"
        );

        let phase = loop {
            if cancel.is_cancelled() {
                break TurnPhase::Cancelled;
            }

            rounds += 1;
            debug!(conversation_id = %conversation_id, round = rounds, phase = ?TurnPhase::Streaming, "Calling model");

            let mut messages = Vec::with_capacity(preamble.len() + history.len() + staged.len());
            messages.extend(preamble.iter().cloned());
            messages.extend(history.iter().cloned());
            messages.extend(staged.iter().cloned());
            let mut request = ProviderRequest::new(&self.model, messages);
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;
            request.tools = definitions.clone();

            match self.stream_round(request, cancel, events).await {
                RoundEnd::Finished {
                    content,
                    calls,
                    usage: round_usage,
                } => {
                    usage = add_usage(usage, round_usage);

                    if calls.is_empty() {
                        staged.push(Message::assistant(content));
                        break TurnPhase::Completed;
                    }

                    debug!(
                        conversation_id = %conversation_id,
                        round = rounds,
                        calls = calls.len(),
                        phase = ?TurnPhase::ToolExecuting,
                        "Executing tool calls"
                    );
                    staged.push(Message::assistant_with_calls(
                        content,
                        calls.iter().map(AccumulatedCall::to_message_call).collect(),
                    ));
                    let results = self.execute_calls(calls, cancel, events).await;
                    staged.extend(results.iter().map(Message::tool_result));

                    if cancel.is_cancelled() {
                        break TurnPhase::Cancelled;
                    }
                    if rounds >= self.max_rounds {
                        warn!(conversation_id = %conversation_id, rounds, "Round budget exhausted");
                        let note = format!(
                            "Stopped after {rounds} model round(s) without a final answer: the round budget is exhausted."
                        );
                        let _ = events.send(TurnEvent::Content {
                            content: note.clone(),
                        });
                        staged.push(Message::assistant(note).with_marker(MessageMarker::BudgetExhausted));
                        break TurnPhase::Completed;
                    }
                }
                RoundEnd::Cancelled { content } => {
                    if !content.is_empty() {
                        staged.push(Message::assistant(content).with_marker(MessageMarker::Partial));
                    }
                    break TurnPhase::Cancelled;
                }
                RoundEnd::Failed { content, reason } => {
                    warn!(conversation_id = %conversation_id, round = rounds, %reason, "Model stream failed");
                    if !content.is_empty() {
                        staged.push(Message::assistant(content).with_marker(MessageMarker::Partial));
                    }
                    staged.push(
                        Message::assistant(format!("The model response failed: {reason}"))
                            .with_marker(MessageMarker::Failure),
                    );
                    error = Some(reason);
                    break TurnPhase::Failed;
                }
            }
        };

        info!(
            conversation_id = %conversation_id,
            phase = ?phase,
            rounds,
            staged = staged.len(),
            "Turn ended"
        );

        TurnOutcome {
            phase,
            messages: staged,
            rounds,
            usage,
            error,
        }
    }

    /// Consume one model stream until its terminal fragment, the interrupt,
    /// or the model timeout.
    async fn stream_round(
        &self,
        request: ProviderRequest,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> RoundEnd {
        let call_token = cancel.child_token();
        let mut rx = self.provider.stream(request, call_token.clone()).await;
        let deadline = tokio::time::sleep(self.model_timeout);
        tokio::pin!(deadline);

        let mut content = String::new();
        let mut accumulator = ToolCallAccumulator::new();

        loop {
            let fragment = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return RoundEnd::Cancelled { content };
                }
                _ = &mut deadline => {
                    call_token.cancel();
                    return RoundEnd::Failed {
                        content,
                        reason: ProviderError::Timeout(format!(
                            "no terminal fragment after {}s",
                            self.model_timeout.as_secs_f32()
                        ))
                        .to_string(),
                    };
                }
                fragment = rx.recv() => fragment,
            };

            match fragment {
                Some(StreamFragment::ContentDelta(text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    content.push_str(&text);
                    let _ = events.send(TurnEvent::Content { content: text });
                }
                Some(StreamFragment::ToolCallDelta(delta)) => accumulator.push(delta),
                Some(StreamFragment::Done { finish_reason, usage }) => {
                    debug!(?finish_reason, calls = accumulator.len(), "Model stream done");
                    return RoundEnd::Finished {
                        content,
                        calls: accumulator.finish(),
                        usage,
                    };
                }
                Some(StreamFragment::Cancelled) => return RoundEnd::Cancelled { content },
                Some(StreamFragment::Failed(reason)) => return RoundEnd::Failed { content, reason },
                None => {
                    return RoundEnd::Failed {
                        content,
                        reason: "model stream closed without a terminal fragment".into(),
                    };
                }
            }
        }
    }

    /// Run a round's calls with bounded concurrency; results keep call order.
    async fn execute_calls(
        &self,
        calls: Vec<AccumulatedCall>,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Vec<ToolResult> {
        futures::stream::iter(calls.into_iter().map(|call| self.execute_one(call, cancel, events)))
            .buffered(self.tool_concurrency)
            .collect()
            .await
    }

    async fn execute_one(
        &self,
        call: AccumulatedCall,
        cancel: &CancellationToken,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> ToolResult {
        let result = if cancel.is_cancelled() {
            ToolResult::error(&call.id, SKIPPED_REASON)
        } else {
            match call.to_tool_call() {
                Some(tool_call) => self.run_tool(tool_call, events).await,
                None => {
                    let reason = call.parsed.as_ref().err().cloned().unwrap_or_default();
                    warn!(tool = %call.name, call_id = %call.id, %reason, "Malformed tool call");
                    ToolResult::error(&call.id, ToolError::InvalidArguments(reason).to_string())
                }
            }
        };

        let _ = events.send(TurnEvent::ToolFinished {
            id: call.id,
            name: call.name,
            status: result.status,
            summary: result.display_summary.clone(),
        });
        result
    }

    /// Execute on its own task so a panicking tool becomes an error result.
    async fn run_tool(&self, call: ToolCall, events: &mpsc::UnboundedSender<TurnEvent>) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Unknown tool requested");
            return ToolResult::error(&call.id, ToolError::NotFound(call.name).to_string());
        };

        let _ = events.send(TurnEvent::ToolStarted {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
        debug!(tool = %call.name, call_id = %call.id, "Executing tool");

        let arguments = call.arguments;
        let mut handle = tokio::spawn(async move { tool.execute(arguments).await });
        match tokio::time::timeout(self.tool_timeout, &mut handle).await {
            Ok(Ok(Ok(output))) => ToolResult::from_output(&call.id, output),
            Ok(Ok(Err(e))) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(&call.id, e.to_string())
            }
            Ok(Err(join_error)) => {
                warn!(tool = %call.name, error = %join_error, "Tool task aborted");
                ToolResult::error(
                    &call.id,
                    ToolError::ExecutionFailed {
                        tool_name: call.name,
                        reason: "tool panicked".into(),
                    }
                    .to_string(),
                )
            }
            Err(_) => {
                handle.abort();
                warn!(tool = %call.name, timeout = ?self.tool_timeout, "Tool timed out");
                ToolResult::error(
                    &call.id,
                    ToolError::Timeout {
                        tool_name: call.name,
                        timeout_secs: self.tool_timeout.as_secs(),
                    }
                    .to_string(),
                )
            }
        }
    }
}

fn add_usage(total: Option<Usage>, round: Option<Usage>) -> Option<Usage> {
    match (total, round) {
        (Some(a), Some(b)) => Some(Usage {
            prompt_tokens: a.prompt_tokens + b.prompt_tokens,
            completion_tokens: a.completion_tokens + b.completion_tokens,
            total_tokens: a.total_tokens + b.total_tokens,
        }),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use toolweave_core::message::Role;
    use toolweave_core::tool::ToolStatus;

    fn input(text: &str) -> TurnInput {
        TurnInput {
            conversation_id: ConversationId::from("test"),
            history: vec![],
            preamble: vec![Message::system("You are helpful.")],
            opening: vec![Message::user(text)],
        }
    }

    fn roles(messages: &[Message]) -> Vec<Role> {
        messages.iter().map(|m| m.role).collect()
    }

    async fn run(turn: &TurnLoop, input: TurnInput) -> (TurnOutcome, Vec<TurnEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = turn.run(input, &CancellationToken::new(), &tx).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        (outcome, events)
    }

    #[tokio::test]
    async fn done_without_tool_calls_completes_with_one_assistant_message() {
        let provider = ScriptedProvider::new(vec![text_script("Hello there!")]);
        let turn = TurnLoop::new(provider.clone(), test_registry(), "test-model");

        let (outcome, events) = run(&turn, input("Hi")).await;

        assert_eq!(outcome.phase, TurnPhase::Completed);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(roles(&outcome.messages), vec![Role::User, Role::Assistant]);
        assert_eq!(outcome.messages[1].content, "Hello there!");
        assert!(outcome.messages[1].marker.is_none());

        let streamed: String = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Content { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(streamed, "Hello there!");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn preamble_and_history_are_sent_but_not_staged() {
        let provider = ScriptedProvider::new(vec![text_script("ok")]);
        let turn = TurnLoop::new(provider.clone(), test_registry(), "test-model");
        let mut turn_input = input("second question");
        turn_input.history = vec![Message::user("first"), Message::assistant("answer")];

        let (outcome, _) = run(&turn, turn_input).await;

        let sent = provider.requests();
        assert_eq!(
            roles(&sent[0].messages),
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(sent[0].tools.len(), test_registry().len());
        assert_eq!(roles(&outcome.messages), vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn tool_round_then_final_answer() {
        let provider = ScriptedProvider::new(vec![
            tool_script(&[("call_1", "echo", r#"{"text":"ping"}"#)]),
            text_script("The tool said ping."),
        ]);
        let turn = TurnLoop::new(provider.clone(), test_registry(), "test-model");

        let (outcome, events) = run(&turn, input("Use the tool")).await;

        assert_eq!(outcome.phase, TurnPhase::Completed);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(
            roles(&outcome.messages),
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(outcome.messages[1].tool_calls[0].id, "call_1");
        assert_eq!(outcome.messages[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(outcome.messages[2].tool_status, Some(ToolStatus::Ok));
        assert_eq!(outcome.messages[2].content, "ping");

        // The second model call sees the tool result
        let second = &provider.requests()[1];
        assert_eq!(second.messages.last().unwrap().role, Role::Tool);

        let kinds: Vec<_> = events.iter().map(TurnEvent::event_type).collect();
        assert_eq!(kinds.first(), Some(&"tool_started"));
        assert_eq!(kinds[1], "tool_finished");
        assert_eq!(kinds.last(), Some(&"content"));
    }

    #[tokio::test]
    async fn interrupt_after_two_of_five_deltas_keeps_partial_content() {
        let provider = ScriptedProvider::new(vec![vec![
            Step::Fragment(StreamFragment::ContentDelta("one ".into())),
            Step::Fragment(StreamFragment::ContentDelta("two ".into())),
            Step::Pause,
            Step::Fragment(StreamFragment::ContentDelta("three ".into())),
            Step::Fragment(StreamFragment::ContentDelta("four ".into())),
            Step::Fragment(StreamFragment::ContentDelta("five".into())),
            Step::Fragment(StreamFragment::done()),
        ]]);
        let turn = Arc::new(TurnLoop::new(provider, test_registry(), "test-model"));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = {
            let turn = turn.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { turn.run(input("count"), &cancel, &tx).await })
        };

        let mut seen = 0;
        while let Some(event) = rx.recv().await {
            if matches!(event, TurnEvent::Content { .. }) {
                seen += 1;
                if seen == 2 {
                    cancel.cancel();
                    break;
                }
            }
        }
        let outcome = task.await.unwrap();

        assert_eq!(outcome.phase, TurnPhase::Cancelled);
        assert_eq!(roles(&outcome.messages), vec![Role::User, Role::Assistant]);
        assert_eq!(outcome.messages[1].content, "one two ");
        assert!(outcome.messages[1].is_partial());
        assert!(outcome.messages.iter().all(|m| m.role != Role::Tool));
    }

    #[tokio::test]
    async fn timed_out_tool_gets_error_result_and_sibling_succeeds() {
        let provider = ScriptedProvider::new(vec![
            tool_script(&[
                ("call_slow", "slow", "{}"),
                ("call_echo", "echo", r#"{"text":"fast"}"#),
            ]),
            text_script("Done."),
        ]);
        let turn = TurnLoop::new(provider.clone(), test_registry(), "test-model")
            .with_tool_timeout(Duration::from_millis(50));

        let (outcome, _) = run(&turn, input("go")).await;

        assert_eq!(outcome.phase, TurnPhase::Completed);
        assert_eq!(
            roles(&outcome.messages),
            vec![Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
        );
        let slow = &outcome.messages[2];
        assert_eq!(slow.tool_call_id.as_deref(), Some("call_slow"));
        assert_eq!(slow.tool_status, Some(ToolStatus::Error));
        assert!(slow.content.contains("timed out"));
        let fast = &outcome.messages[3];
        assert_eq!(fast.tool_call_id.as_deref(), Some("call_echo"));
        assert_eq!(fast.tool_status, Some(ToolStatus::Ok));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn results_keep_declared_order_under_concurrency() {
        let provider = ScriptedProvider::new(vec![
            tool_script(&[
                ("a", "delay", r#"{"ms": 80}"#),
                ("b", "delay", r#"{"ms": 1}"#),
                ("c", "delay", r#"{"ms": 30}"#),
            ]),
            text_script("ok"),
        ]);
        let turn = TurnLoop::new(provider, test_registry(), "test-model").with_tool_concurrency(3);

        let (outcome, _) = run(&turn, input("go")).await;

        let ids: Vec<_> = outcome
            .messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn round_budget_of_one_stops_after_first_model_call() {
        let provider = ScriptedProvider::repeating(tool_script(&[("call_1", "echo", r#"{"text":"again"}"#)]));
        let turn = TurnLoop::new(provider.clone(), test_registry(), "test-model").with_max_rounds(1);

        let (outcome, _) = run(&turn, input("loop forever")).await;

        assert_eq!(outcome.phase, TurnPhase::Completed);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(outcome.rounds, 1);
        let last = outcome.messages.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.marker, Some(MessageMarker::BudgetExhausted));
    }

    #[tokio::test]
    async fn malformed_and_unknown_calls_become_error_results() {
        let provider = ScriptedProvider::new(vec![
            tool_script(&[
                ("bad", "echo", r#"{"text": "#),
                ("missing", "nonexistent", "{}"),
                ("good", "echo", r#"{"text":"fine"}"#),
            ]),
            text_script("ok"),
        ]);
        let turn = TurnLoop::new(provider, test_registry(), "test-model");

        let (outcome, events) = run(&turn, input("go")).await;

        let tools: Vec<_> = outcome.messages.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tools.len(), 3);
        assert_eq!(tools[0].tool_status, Some(ToolStatus::Error));
        assert!(tools[0].content.contains("invalid JSON"));
        assert_eq!(tools[1].tool_status, Some(ToolStatus::Error));
        assert!(tools[1].content.contains("Tool not found"));
        assert_eq!(tools[2].tool_status, Some(ToolStatus::Ok));
        assert_eq!(outcome.phase, TurnPhase::Completed);

        // Only the runnable calls are reported as started
        let started = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::ToolStarted { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn panicking_tool_becomes_error_result() {
        let provider = ScriptedProvider::new(vec![
            tool_script(&[("call_1", "panic", "{}")]),
            text_script("recovered"),
        ]);
        let turn = TurnLoop::new(provider, test_registry(), "test-model");

        let (outcome, _) = run(&turn, input("go")).await;

        assert_eq!(outcome.phase, TurnPhase::Completed);
        assert_eq!(outcome.messages[2].tool_status, Some(ToolStatus::Error));
        assert!(outcome.messages[2].content.contains("panicked"));
    }

    #[tokio::test]
    async fn stream_failure_keeps_partial_and_adds_failure_note() {
        let provider = ScriptedProvider::new(vec![vec![
            Step::Fragment(StreamFragment::ContentDelta("Half an ans".into())),
            Step::Fragment(StreamFragment::Failed("connection reset".into())),
        ]]);
        let turn = TurnLoop::new(provider, test_registry(), "test-model");

        let (outcome, _) = run(&turn, input("go")).await;

        assert_eq!(outcome.phase, TurnPhase::Failed);
        assert_eq!(outcome.error.as_deref(), Some("connection reset"));
        assert_eq!(
            roles(&outcome.messages),
            vec![Role::User, Role::Assistant, Role::Assistant]
        );
        assert!(outcome.messages[1].is_partial());
        assert_eq!(outcome.messages[2].marker, Some(MessageMarker::Failure));
        assert!(outcome.messages[2].content.contains("connection reset"));
    }

    #[tokio::test]
    async fn model_timeout_fails_the_turn() {
        let provider = ScriptedProvider::new(vec![vec![
            Step::Fragment(StreamFragment::ContentDelta("thinking".into())),
            Step::Pause,
        ]]);
        let turn = TurnLoop::new(provider, test_registry(), "test-model")
            .with_model_timeout(Duration::from_millis(50));

        let (outcome, _) = run(&turn, input("go")).await;

        assert_eq!(outcome.phase, TurnPhase::Failed);
        assert!(outcome.error.unwrap().contains("timed out"));
        assert!(outcome.messages[1].is_partial());
    }

    #[tokio::test]
    async fn stream_without_terminal_fragment_fails() {
        let provider = ScriptedProvider::new(vec![vec![Step::Fragment(StreamFragment::ContentDelta(
            "cut".into(),
        ))]]);
        let turn = TurnLoop::new(provider, test_registry(), "test-model");

        let (outcome, _) = run(&turn, input("go")).await;
        assert_eq!(outcome.phase, TurnPhase::Failed);
    }

    #[tokio::test]
    async fn interrupt_during_tools_skips_unstarted_calls() {
        let provider = ScriptedProvider::new(vec![tool_script(&[
            ("first", "cancel", "{}"),
            ("second", "echo", r#"{"text":"never"}"#),
        ])]);
        let cancel = CancellationToken::new();
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CancelTool(cancel.clone())));
        registry.register(Arc::new(EchoTool));
        let turn = TurnLoop::new(provider.clone(), Arc::new(registry), "test-model").with_tool_concurrency(1);
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = turn.run(input("go"), &cancel, &tx).await;

        assert_eq!(outcome.phase, TurnPhase::Cancelled);
        assert_eq!(provider.call_count(), 1);
        let tools: Vec<_> = outcome.messages.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].tool_status, Some(ToolStatus::Ok));
        assert_eq!(tools[1].tool_status, Some(ToolStatus::Error));
        assert!(tools[1].content.contains(SKIPPED_REASON));
    }

    #[test]
    fn usage_adds_up() {
        let u = |n| Usage {
            prompt_tokens: n,
            completion_tokens: n,
            total_tokens: 2 * n,
        };
        assert_eq!(add_usage(None, None), None);
        assert_eq!(add_usage(Some(u(1)), None), Some(u(1)));
        assert_eq!(add_usage(Some(u(1)), Some(u(2))), Some(u(3)));
    }
}
