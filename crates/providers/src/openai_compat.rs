//! OpenAI-compatible provider implementation.
//!
//! Works with Moonshot (Kimi), OpenRouter, and any endpoint that exposes
//! `/chat/completions` in the OpenAI shape.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling
//! - Streamed `reasoning_content` from thinking models
//! - Remote token estimation (`/tokenizers/estimate-token-count`)

use async_trait::async_trait;
use futures::StreamExt;
use inkloop_core::error::ProviderError;
use inkloop_core::message::{Message, Role, ToolCall};
use inkloop_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const ESTIMATE_TIMEOUT: Duration = Duration::from_secs(30);

/// An OpenAI-compatible chat provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        // No overall timeout: a thinking-model stream may legitimately run for minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create a Moonshot provider (convenience constructor).
    pub fn moonshot(api_key: impl Into<String>) -> Self {
        Self::new("moonshot", "https://api.moonshot.ai/v1", api_key)
    }

    /// Create a provider for `base_url`, naming it after the host.
    pub fn for_base_url(base_url: &str, api_key: impl Into<String>) -> Self {
        let name = if base_url.contains("openrouter.ai") {
            "openrouter"
        } else if base_url.contains("moonshot") {
            "moonshot"
        } else {
            "openai-compat"
        };
        Self::new(name, base_url, api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    ///
    /// Reasoning text is never sent back to the endpoint.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: m.content.clone(),
                reasoning_content: None,
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
                name: m.name.clone(),
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

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    /// Map a non-success status to the matching `ProviderError`.
    async fn check_status(
        response: reqwest::Response,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request, false);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = Self::check_status(response).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        let mut message = Message::assistant_tool_calls(tool_calls);
        message.content = choice.message.content.filter(|c| !c.is_empty());
        message.reasoning_content = choice.message.reasoning_content.filter(|r| !r.is_empty());

        Ok(ProviderResponse {
            message,
            usage: api_response.usage.map(Usage::from),
            model: api_response.model,
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut body = Self::request_body(&request, true);
        body["stream_options"] = serde_json::json!({ "include_usage": true });

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = Self::check_status(response).await?;

        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and forward fragments in arrival order
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    match parse_sse_line(&line) {
                        SseLine::Done => return,
                        SseLine::Chunk(chunk) => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseLine::Skip => {}
                        SseLine::Unparseable(e) => {
                            trace!(
                                provider = %provider_name,
                                line = %line,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }

            warn!(provider = %provider_name, "Stream closed before [DONE]");
            let _ = tx
                .send(Err(ProviderError::StreamInterrupted(
                    "connection closed before the end of the stream".into(),
                )))
                .await;
        });

        Ok(rx)
    }

    async fn count_tokens(
        &self,
        model: &str,
        messages: &[Message],
    ) -> std::result::Result<u32, ProviderError> {
        if self.base_url.contains("openrouter.ai") {
            return Err(ProviderError::Unsupported(format!(
                "token estimation is not available on {}",
                self.base_url
            )));
        }

        let url = format!("{}/tokenizers/estimate-token-count", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "messages": Self::to_api_messages(messages),
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(ESTIMATE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().as_u16() == 405 {
            return Err(ProviderError::Unsupported(format!(
                "{url} does not accept token estimation requests"
            )));
        }

        let response = Self::check_status(response).await?;
        let estimate: EstimateResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse token estimate: {e}"),
            })?;

        Ok(estimate.data.total_tokens)
    }
}

/// Splits an SSE byte stream into lines.
///
/// Bytes are buffered until a full line is available, so a multi-byte
/// character split across reads is decoded whole.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    /// Append `bytes` and return every line completed by them.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw[..end]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }
}

/// What one line of an SSE body means to the reader.
#[derive(Debug)]
enum SseLine {
    Chunk(StreamChunk),
    Done,
    Skip,
    Unparseable(serde_json::Error),
}

fn parse_sse_line(line: &str) -> SseLine {
    // Skip empty lines, SSE comments, and non-data fields
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => match chunk_from_response(resp) {
            Some(chunk) => SseLine::Chunk(chunk),
            None => SseLine::Skip,
        },
        Err(e) => SseLine::Unparseable(e),
    }
}

/// Convert one SSE payload into a fragment. Returns `None` for empty keep-alives.
fn chunk_from_response(resp: StreamResponse) -> Option<StreamChunk> {
    let mut chunk = StreamChunk {
        usage: resp.usage.map(Usage::from),
        ..StreamChunk::default()
    };

    if let Some(choice) = resp.choices.into_iter().next() {
        let delta = choice.delta;
        chunk.role = delta.role;
        chunk.content = delta.content.filter(|c| !c.is_empty());
        chunk.reasoning = delta.reasoning_content.filter(|r| !r.is_empty());
        chunk.tool_calls = delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let (name, arguments) = match tc.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                ToolCallDelta {
                    index: tc.index,
                    id: tc.id,
                    name,
                    arguments,
                }
            })
            .collect();
        chunk.finish_reason = choice.finish_reason;
    }

    (chunk != StreamChunk::default()).then_some(chunk)
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing)]
    reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
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
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EstimateResponse {
    data: EstimateData,
}

#[derive(Debug, Deserialize)]
struct EstimateData {
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
    role: Option<Role>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta, arriving incrementally across chunks.
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

    fn chunk(line: &str) -> StreamChunk {
        match parse_sse_line(line) {
            SseLine::Chunk(c) => c,
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn moonshot_constructor() {
        let provider = OpenAiCompatProvider::moonshot("sk-test");
        assert_eq!(provider.name(), "moonshot");
        assert_eq!(provider.base_url(), "https://api.moonshot.ai/v1");
    }

    #[test]
    fn provider_named_after_host() {
        let p = OpenAiCompatProvider::for_base_url("https://openrouter.ai/api/v1/", "k");
        assert_eq!(p.name(), "openrouter");
        assert_eq!(p.base_url(), "https://openrouter.ai/api/v1");
    }

    #[test]
    fn message_conversion_drops_reasoning() {
        let mut assistant = Message::assistant("draft ready");
        assistant.reasoning_content = Some("private deliberation".into());
        let api = OpenAiCompatProvider::to_api_messages(&[Message::system("sys"), assistant]);
        assert_eq!(api[0].role, "system");
        assert!(api[1].reasoning_content.is_none());
        let json = serde_json::to_string(&api[1]).unwrap();
        assert!(!json.contains("private deliberation"));
        assert!(json.contains("draft ready"));
    }

    #[test]
    fn message_conversion_tool_response() {
        let msg = Message::tool_result("call_1", "read_file", "chapter text");
        let api = OpenAiCompatProvider::to_api_messages(&[msg]);
        assert_eq!(api[0].role, "tool");
        assert_eq!(api[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(api[0].name.as_deref(), Some("read_file"));
    }

    #[test]
    fn tool_only_turn_omits_content() {
        let msg = Message::assistant_tool_calls(vec![ToolCall::new("c", "list_files", "{}")]);
        let json = serde_json::to_value(OpenAiCompatProvider::to_api_messages(&[msg])).unwrap();
        assert!(json[0].get("content").is_none());
        assert_eq!(json[0]["tool_calls"][0]["function"]["name"], "list_files");
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "web_search".into(),
            description: "Search the web".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatProvider::to_api_tools(&tools);
        assert_eq!(api_tools[0].function.name, "web_search");
        assert_eq!(api_tools[0].r#type, "function");
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_role_marker() {
        let c = chunk(r#"data: {"choices":[{"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#);
        assert_eq!(c.role, Some(Role::Assistant));
        assert!(c.content.is_none());
    }

    #[test]
    fn parse_reasoning_delta() {
        let c = chunk(r#"data: {"choices":[{"delta":{"reasoning_content":"Let me think"},"finish_reason":null}]}"#);
        assert_eq!(c.reasoning.as_deref(), Some("Let me think"));
    }

    #[test]
    fn parse_tool_call_deltas_without_accumulating() {
        let first = chunk(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"write_file","arguments":""}}]},"finish_reason":null}]}"#);
        assert_eq!(first.tool_calls[0].id.as_deref(), Some("call_abc"));
        assert_eq!(first.tool_calls[0].name.as_deref(), Some("write_file"));

        let second = chunk(r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"file"}}]},"finish_reason":null}]}"#);
        assert!(second.tool_calls[0].id.is_none());
        assert_eq!(second.tool_calls[0].arguments.as_deref(), Some("{\"file"));
    }

    #[test]
    fn parse_finish_and_usage() {
        let c = chunk(r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);
        assert_eq!(c.finish_reason.as_deref(), Some("tool_calls"));

        let u = chunk(r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#);
        assert_eq!(u.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn parse_control_lines() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
        assert!(matches!(parse_sse_line(": keep-alive"), SseLine::Skip));
        assert!(matches!(parse_sse_line(""), SseLine::Skip));
        assert!(matches!(
            parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":null}]}"#),
            SseLine::Skip
        ));
        assert!(matches!(
            parse_sse_line("data: {broken"),
            SseLine::Unparseable(_)
        ));
    }

    #[test]
    fn line_buffer_keeps_split_code_points_whole() {
        let mut buffer = SseLineBuffer::default();
        let line = "data: café\r\n".as_bytes();
        let cut = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert!(buffer.push(&line[..cut]).is_empty());
        assert_eq!(buffer.push(&line[cut..]), vec!["data: café".to_string()]);
    }

    #[test]
    fn line_buffer_yields_several_lines_per_read() {
        let mut buffer = SseLineBuffer::default();
        assert_eq!(buffer.push(b"a\nb\nc"), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(buffer.push(b"\n"), vec!["c".to_string()]);
    }

    /// Serve one SSE response, written in `parts` with a pause between them.
    async fn serve_sse(parts: Vec<Vec<u8>>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Read the whole request so closing never resets the connection.
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for part in parts {
                socket.write_all(&part).await.unwrap();
                socket.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    fn stream_request() -> ProviderRequest {
        ProviderRequest {
            model: "m".into(),
            messages: vec![Message::user("hi")],
            temperature: 1.0,
            max_tokens: None,
            tools: vec![],
            stream: true,
        }
    }

    async fn drain(mut rx: ChunkReceiver) -> Vec<std::result::Result<StreamChunk, ProviderError>> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn stream_decodes_code_points_split_across_reads() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"},\"finish_reason\":null}]}\n\n\
                    data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n\
                    data: [DONE]\n\n"
            .as_bytes();
        let cut = body.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let url = serve_sse(vec![body[..cut].to_vec(), body[cut..].to_vec()]).await;

        let provider = OpenAiCompatProvider::new("local", &url, "k");
        let items = drain(provider.stream(stream_request()).await.unwrap()).await;

        let content: String = items
            .iter()
            .filter_map(|i| i.as_ref().ok()?.content.clone())
            .collect();
        assert_eq!(content, "café");
        assert!(items.iter().all(|i| i.is_ok()));
    }

    #[tokio::test]
    async fn stream_closed_before_done_is_interrupted() {
        let body = b"data: {\"choices\":[{\"delta\":{\"content\":\"half a tho\"},\"finish_reason\":null}]}\n\n";
        let url = serve_sse(vec![body.to_vec()]).await;

        let provider = OpenAiCompatProvider::new("local", &url, "k");
        let items = drain(provider.stream(stream_request()).await.unwrap()).await;

        assert!(items[0].is_ok());
        assert!(matches!(
            items.last(),
            Some(Err(ProviderError::StreamInterrupted(_)))
        ));
    }

    #[test]
    fn parse_estimate_response() {
        let parsed: EstimateResponse =
            serde_json::from_str(r#"{"code":0,"data":{"total_tokens":4321},"scode":"0x0"}"#)
                .unwrap();
        assert_eq!(parsed.data.total_tokens, 4321);
    }

    #[tokio::test]
    async fn openrouter_has_no_estimate_endpoint() {
        let p = OpenAiCompatProvider::for_base_url("https://openrouter.ai/api/v1", "k");
        let err = p.count_tokens("m", &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }

    #[tokio::test]
    async fn unreachable_estimate_endpoint_is_network_error() {
        let p = OpenAiCompatProvider::new("local", "http://127.0.0.1:9", "k");
        let err = p
            .count_tokens("m", &[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Network(_) | ProviderError::Timeout(_)
        ));
    }
}
