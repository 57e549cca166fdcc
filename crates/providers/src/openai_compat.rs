//! OpenAI-compatible provider implementation.
//!
//! Works with: LM Studio, Ollama, vLLM, llama.cpp server, OpenAI, OpenRouter,
//! and any endpoint exposing a streaming `/v1/chat/completions`.
//!
//! The HTTP response is read on a spawned task and translated into
//! [`StreamFragment`]s. The task races the byte stream against the caller's
//! cancellation token, so a cancelled turn drops the connection immediately.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use toolweave_core::error::ProviderError;
use toolweave_core::message::{Message, Role};
use toolweave_core::provider::*;
use tracing::{debug, trace, warn};

use crate::reasoning::ReasoningFilter;

/// An OpenAI-compatible model provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    strip_reasoning: bool,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        // No overall timeout: streams run as long as the model talks and the
        // engine enforces its own per-call deadline.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            strip_reasoning: false,
            client,
        }
    }

    /// A local LM Studio server (convenience constructor).
    pub fn lmstudio(base_url: Option<&str>) -> Self {
        Self::new(
            "lmstudio",
            base_url.unwrap_or("http://127.0.0.1:1234/v1"),
            "lm-studio",
        )
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Remove `<think>` blocks from streamed content.
    pub fn with_reasoning_filter(mut self, enabled: bool) -> Self {
        self.strip_reasoning = enabled;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        body
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StreamFragment> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let http_request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body);

        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();
        let filter = self.strip_reasoning.then(ReasoningFilter::new);

        tokio::spawn(async move {
            let terminal = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(provider = %provider_name, "Stream cancelled");
                    StreamFragment::Cancelled
                }
                terminal = pump(http_request, &tx, &provider_name, filter) => terminal,
            };
            let _ = tx.send(terminal).await;
        });

        rx
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

/// Send the request and forward decoded fragments until a terminal one.
///
/// Returns the terminal fragment instead of sending it, so the caller can
/// substitute `Cancelled` if the token fires first.
async fn pump(
    request: reqwest::RequestBuilder,
    tx: &mpsc::Sender<StreamFragment>,
    provider: &str,
    mut filter: Option<ReasoningFilter>,
) -> StreamFragment {
    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => return StreamFragment::Failed(ProviderError::Network(e.to_string()).to_string()),
    };

    let status = response.status().as_u16();
    if status != 200 {
        let error_body = response.text().await.unwrap_or_default();
        warn!(provider, status, body = %error_body, "Provider streaming error");
        return StreamFragment::Failed(status_error(status, error_body).to_string());
    }

    let mut decoder = SseDecoder::default();
    let mut byte_stream = response.bytes_stream();

    loop {
        let fragments = match byte_stream.next().await {
            Some(Ok(bytes)) => decoder.push(&bytes),
            Some(Err(e)) => {
                return StreamFragment::Failed(
                    ProviderError::StreamInterrupted(e.to_string()).to_string(),
                );
            }
            None => vec![decoder.finish()],
        };

        for fragment in fragments {
            let fragment = match (fragment, filter.as_mut()) {
                (StreamFragment::ContentDelta(text), Some(f)) => {
                    let visible = f.push(&text);
                    if visible.is_empty() {
                        continue;
                    }
                    StreamFragment::ContentDelta(visible)
                }
                (other, _) => other,
            };

            if fragment.is_terminal() {
                if let Some(rest) = filter.as_mut().map(ReasoningFilter::finish) {
                    if !rest.is_empty() {
                        let _ = tx.send(StreamFragment::ContentDelta(rest)).await;
                    }
                }
                return fragment;
            }

            if tx.send(fragment).await.is_err() {
                trace!(provider, "Receiver dropped, abandoning stream");
                return StreamFragment::Cancelled;
            }
        }
    }
}

fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited,
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// Incremental decoder for an OpenAI-style SSE body.
///
/// Bytes are buffered until a full line is available so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    terminated: bool,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<StreamFragment> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        while !self.terminated {
            let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            self.decode_line(line.trim_end_matches(['\r', '\n']), &mut out);
        }

        out
    }

    fn decode_line(&mut self, line: &str, out: &mut Vec<StreamFragment>) {
        // Skip empty lines, SSE comments and non-data fields
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();

        if data == "[DONE]" {
            out.push(self.done());
            return;
        }

        let chunk = match serde_json::from_str::<StreamResponse>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                return;
            }
        };

        if let Some(error) = chunk.error {
            self.terminated = true;
            out.push(StreamFragment::Failed(error.message));
            return;
        }

        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                out.push(StreamFragment::ContentDelta(content));
            }

            for tc in choice.delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                out.push(StreamFragment::ToolCallDelta(ToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name,
                    arguments,
                }));
            }

            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(FinishReason::parse(&reason));
            }
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }
    }

    fn done(&mut self) -> StreamFragment {
        self.terminated = true;
        StreamFragment::Done {
            finish_reason: self.finish_reason.take().unwrap_or(FinishReason::Stop),
            usage: self.usage.take(),
        }
    }

    /// The byte stream ended; decide how the model call ended.
    fn finish(&mut self) -> StreamFragment {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).into_owned();
            self.decode_line(line.trim_end_matches(['\r', '\n']), &mut out);
        }
        if let Some(terminal) = out.into_iter().find(StreamFragment::is_terminal) {
            return terminal;
        }
        if self.finish_reason.is_some() {
            self.done()
        } else {
            StreamFragment::Failed("stream ended without completion".into())
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta — arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolweave_core::message::MessageToolCall;
    use toolweave_core::tool::ToolResult;

    fn decode_all(body: &str) -> Vec<StreamFragment> {
        let mut decoder = SseDecoder::default();
        let mut out = decoder.push(body.as_bytes());
        if !out.last().is_some_and(StreamFragment::is_terminal) {
            out.push(decoder.finish());
        }
        out
    }

    #[test]
    fn lmstudio_constructor() {
        let provider = OpenAiCompatProvider::lmstudio(None);
        assert_eq!(provider.name(), "lmstudio");
        assert!(provider.base_url().contains("127.0.0.1:1234"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("x", "http://host/v1/", "");
        assert_eq!(provider.base_url(), "http://host/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_with_calls(
            "",
            vec![MessageToolCall {
                id: "call_1".into(),
                name: "wiki".into(),
                arguments: r#"{"query":"Rust"}"#.into(),
            }],
        );
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc.len(), 1);
        assert_eq!(tc[0].function.name, "wiki");
        assert_eq!(tc[0].r#type, "function");
    }

    #[test]
    fn message_conversion_tool_response() {
        let msg = Message::tool_result(&ToolResult::ok("call_1", serde_json::json!("data"), "data"));
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(api_msgs[0].content.as_deref(), Some("data"));
    }

    #[test]
    fn request_body_includes_tools_only_when_present() {
        let mut request = ProviderRequest::new("qwen", vec![Message::user("hi")]);
        let body = OpenAiCompatProvider::request_body(&request);
        assert!(body.get("tools").is_none());
        assert_eq!(body["stream"], true);

        request.tools.push(ToolDefinition {
            name: "wiki".into(),
            description: "Look up".into(),
            parameters: serde_json::json!({"type": "object"}),
        });
        request.max_tokens = Some(256);
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["tools"][0]["function"]["name"], "wiki");
        assert_eq!(body["max_tokens"], 256);
    }

    // --- SSE decoding ---

    #[test]
    fn decodes_content_then_done() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let fragments = decode_all(body);
        assert_eq!(
            fragments,
            vec![
                StreamFragment::ContentDelta("Hel".into()),
                StreamFragment::ContentDelta("lo".into()),
                StreamFragment::Done {
                    finish_reason: FinishReason::Stop,
                    usage: None
                },
            ]
        );
    }

    #[test]
    fn decodes_tool_call_deltas() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_a\",\"function\":{\"name\":\"wiki\",\"arguments\":\"\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"query\\\":\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"Rust\\\"}\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n",
            "data: [DONE]\n",
        );
        let fragments = decode_all(body);
        assert_eq!(fragments.len(), 4);
        assert_eq!(
            fragments[0],
            StreamFragment::ToolCallDelta(ToolCallDelta {
                index: 0,
                id: Some("call_a".into()),
                name: Some("wiki".into()),
                arguments: Some(String::new()),
            })
        );
        let StreamFragment::ToolCallDelta(second) = &fragments[1] else {
            panic!("expected tool call delta");
        };
        assert!(second.id.is_none());
        assert_eq!(second.arguments.as_deref(), Some("{\"query\":"));
        assert!(matches!(
            fragments[3],
            StreamFragment::Done { finish_reason: FinishReason::ToolCalls, .. }
        ));
    }

    #[test]
    fn usage_is_attached_to_done() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"},\"finish_reason\":\"stop\"}]}\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15}}\n",
            "data: [DONE]\n",
        );
        let fragments = decode_all(body);
        let StreamFragment::Done { usage: Some(usage), .. } = fragments.last().unwrap() else {
            panic!("expected done with usage");
        };
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn lines_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"con").is_empty());
        let out = decoder.push(b"tent\":\"hi\"}}]}\r\n");
        assert_eq!(out, vec![StreamFragment::ContentDelta("hi".into())]);
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n";
        let bytes = line.as_bytes();
        let split = line.find('é').unwrap() + 1; // inside the two-byte sequence
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let out = decoder.push(&bytes[split..]);
        assert_eq!(out, vec![StreamFragment::ContentDelta("héllo".into())]);
    }

    #[test]
    fn comments_and_garbage_are_ignored() {
        let body = ": keep-alive\nevent: ping\ndata: not json\ndata: [DONE]\n";
        assert_eq!(decode_all(body), vec![StreamFragment::done()]);
    }

    #[test]
    fn finish_reason_without_done_marker_completes() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"},\"finish_reason\":\"length\"}]}\n";
        let fragments = decode_all(body);
        assert!(matches!(
            fragments.last(),
            Some(StreamFragment::Done { finish_reason: FinishReason::Length, .. })
        ));
    }

    #[test]
    fn truncated_stream_fails() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n";
        let fragments = decode_all(body);
        assert!(matches!(fragments.last(), Some(StreamFragment::Failed(_))));
    }

    #[test]
    fn error_payload_fails_stream() {
        let body = "data: {\"error\":{\"message\":\"model not loaded\"}}\ndata: [DONE]\n";
        let fragments = decode_all(body);
        assert_eq!(fragments, vec![StreamFragment::Failed("model not loaded".into())]);
    }

    #[test]
    fn status_errors_are_readable() {
        assert!(matches!(status_error(429, String::new()), ProviderError::RateLimited));
        assert!(matches!(
            status_error(401, String::new()),
            ProviderError::AuthenticationFailed(_)
        ));
        let err = status_error(500, "boom".into());
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_failed() {
        let provider = OpenAiCompatProvider::new("dead", "http://127.0.0.1:9/v1", "");
        let mut rx = provider
            .stream(ProviderRequest::new("m", vec![Message::user("hi")]), CancellationToken::new())
            .await;
        let fragment = rx.recv().await.unwrap();
        assert!(matches!(fragment, StreamFragment::Failed(_)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_token_yields_cancelled() {
        let provider = OpenAiCompatProvider::new("dead", "http://10.255.255.1/v1", "");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rx = provider
            .stream(ProviderRequest::new("m", vec![]), cancel)
            .await;
        assert_eq!(rx.recv().await, Some(StreamFragment::Cancelled));
    }
}
