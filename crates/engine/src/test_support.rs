//! Scripted provider and small tools shared by the engine tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use toolweave_core::error::ToolError;
use toolweave_core::provider::{FinishReason, Provider, ProviderRequest, StreamFragment, ToolCallDelta};
use toolweave_core::tool::{Tool, ToolOutput, ToolRegistry};

#[derive(Debug, Clone)]
pub enum Step {
    Fragment(StreamFragment),
    /// Hold the stream open until the call is cancelled.
    Pause,
}

/// Plays back one script per model call.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    repeat: Option<Vec<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Vec<Step>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Answer every call with the same script.
    pub fn repeating(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(VecDeque::new()),
            repeat: Some(script),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest, cancel: CancellationToken) -> mpsc::Receiver<StreamFragment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone())
            .unwrap_or_else(|| vec![Step::Fragment(StreamFragment::Failed("script exhausted".into()))]);

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for step in script {
                match step {
                    Step::Fragment(fragment) => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                let _ = tx.send(StreamFragment::Cancelled).await;
                                return;
                            }
                            sent = tx.send(fragment) => {
                                if sent.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Step::Pause => {
                        cancel.cancelled().await;
                        let _ = tx.send(StreamFragment::Cancelled).await;
                        return;
                    }
                }
            }
        });
        rx
    }
}

/// A plain answer streamed in a few pieces.
pub fn text_script(text: &str) -> Vec<Step> {
    let mut steps: Vec<Step> = text
        .split_inclusive(' ')
        .map(|piece| Step::Fragment(StreamFragment::ContentDelta(piece.to_string())))
        .collect();
    steps.push(Step::Fragment(StreamFragment::done()));
    steps
}

/// One round of tool calls: `(id, name, arguments)` per call, with the
/// arguments split in two to exercise accumulation.
pub fn tool_script(calls: &[(&str, &str, &str)]) -> Vec<Step> {
    let mut steps = Vec::new();
    for (index, (id, name, arguments)) in calls.iter().enumerate() {
        let split = arguments.len() / 2;
        let (head, tail) = arguments.split_at(split);
        steps.push(Step::Fragment(StreamFragment::ToolCallDelta(ToolCallDelta {
            index: index as u32,
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            arguments: Some(head.to_string()),
        })));
        steps.push(Step::Fragment(StreamFragment::ToolCallDelta(ToolCallDelta {
            index: index as u32,
            arguments: Some(tail.to_string()),
            ..Default::default()
        })));
    }
    steps.push(Step::Fragment(StreamFragment::Done {
        finish_reason: FinishReason::ToolCalls,
        usage: None,
    }));
    steps
}

pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echo the text back"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text(arguments["text"].as_str().unwrap_or_default()))
    }
}

/// Sleeps for `ms` milliseconds, then succeeds.
pub struct DelayTool;

#[async_trait]
impl Tool for DelayTool {
    fn name(&self) -> &str {
        "delay"
    }
    fn description(&self) -> &str {
        "Wait a while"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"ms": {"type": "integer"}}})
    }
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let ms = arguments["ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(ToolOutput::text(format!("waited {ms}ms")))
    }
}

/// Never finishes within a test's tool timeout.
pub struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }
    fn description(&self) -> &str {
        "Takes far too long"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(ToolOutput::text("too late"))
    }
}

pub struct PanicTool;

#[async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        "panic"
    }
    fn description(&self) -> &str {
        "Always panics"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        panic!("tool exploded");
    }
}

/// Interrupts the turn it runs in, then succeeds.
pub struct CancelTool(pub CancellationToken);

#[async_trait]
impl Tool for CancelTool {
    fn name(&self) -> &str {
        "cancel"
    }
    fn description(&self) -> &str {
        "Interrupts the turn"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        self.0.cancel();
        Ok(ToolOutput::text("cancelled"))
    }
}

pub fn test_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));
    registry.register(Arc::new(DelayTool));
    registry.register(Arc::new(SlowTool));
    registry.register(Arc::new(PanicTool));
    Arc::new(registry)
}
