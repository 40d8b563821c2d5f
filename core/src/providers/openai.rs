use crate::traits::{
    ChatMessage, ChatRequest, Provider, StreamEvent, TokenUsage, ToolCall, ToolSpec,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{BoxStream, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, trace, warn};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool<'a>>>,
    temperature: f64,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCallRequest<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ApiToolCallRequest<'a> {
    id: &'a str,
    r#type: &'a str,
    function: ApiFunctionRequest<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionRequest<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    r#type: &'a str,
    function: &'a ToolSpec,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
    tool_calls: Option<Vec<CompletionToolCall>>,
}

#[derive(Debug, Deserialize)]
struct CompletionToolCall {
    #[serde(default)]
    id: String,
    function: CompletionFunction,
}

#[derive(Debug, Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    cached_tokens: Option<u64>,
}

impl From<ApiUsage> for TokenUsage {
    fn from(usage: ApiUsage) -> Self {
        TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cached_tokens: usage
                .prompt_tokens_details
                .and_then(|d| d.cached_tokens)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<ApiUsage>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Incremental state of one streamed response.
#[derive(Debug, Default)]
struct SseState {
    pending: BTreeMap<usize, PendingToolCall>,
    finish_reason: Option<String>,
    completed: bool,
}

impl SseState {
    fn parse_sse_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
            return vec![];
        };

        trace!("SSE data: {}", data);

        if data == "[DONE]" {
            return self.finish();
        }

        let chunk = match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Skipping malformed stream chunk: {}", e);
                return vec![];
            }
        };

        let mut events = Vec::new();

        if let Some(err) = chunk.error {
            events.push(StreamEvent::Error(err.message));
        }

        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(content) = choice.delta.content
                && !content.is_empty()
            {
                events.push(StreamEvent::TextDelta(content));
            }

            for delta in choice.delta.tool_calls.into_iter().flatten() {
                let entry = self.pending.entry(delta.index).or_default();
                if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                    entry.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                        entry.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
                events.extend(self.flush_tool_calls());
            }
        }

        if let Some(usage) = chunk.usage
            && !self.completed
        {
            events.extend(self.flush_tool_calls());
            events.push(StreamEvent::MessageComplete {
                finish_reason: self.finish_reason.clone(),
                usage: Some(usage.into()),
            });
            self.completed = true;
        }

        events
    }

    /// Flushes whatever is still pending once the body ends.
    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = self.flush_tool_calls();
        if !self.completed {
            events.push(StreamEvent::MessageComplete {
                finish_reason: self.finish_reason.clone(),
                usage: None,
            });
            self.completed = true;
        }
        events
    }

    /// Discards partial tool calls after a transport fault.
    fn abort(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "Discarding {} incomplete streamed tool call(s)",
                self.pending.len()
            );
        }
        self.pending.clear();
        self.completed = true;
    }

    fn flush_tool_calls(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.pending)
            .into_values()
            .filter_map(|pending| {
                if pending.name.is_empty() {
                    warn!("Dropping streamed tool call without a name (id {:?})", pending.id);
                    return None;
                }
                Some(StreamEvent::ToolCallComplete(ToolCall {
                    id: call_id_or_new(pending.id),
                    arguments: parse_arguments(&pending.name, &pending.arguments),
                    name: pending.name,
                }))
            })
            .collect()
    }
}

fn call_id_or_new(id: String) -> String {
    if id.is_empty() {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    } else {
        id
    }
}

fn parse_arguments(tool_name: &str, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(arguments)) => arguments,
        _ => {
            warn!("Malformed arguments for tool {}: {}", tool_name, raw);
            Map::new()
        }
    }
}

fn completion_events(completion: ChatCompletion) -> anyhow::Result<Vec<StreamEvent>> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No choices in response"))?;

    let mut events = Vec::new();
    if let Some(content) = choice.message.content
        && !content.is_empty()
    {
        events.push(StreamEvent::TextDelta(content));
    }

    for call in choice.message.tool_calls.into_iter().flatten() {
        events.push(StreamEvent::ToolCallComplete(ToolCall {
            arguments: parse_arguments(&call.function.name, &call.function.arguments),
            id: call_id_or_new(call.id),
            name: call.function.name,
        }));
    }

    events.push(StreamEvent::MessageComplete {
        finish_reason: choice.finish_reason,
        usage: completion.usage.map(Into::into),
    });

    Ok(events)
}

/// Reads an SSE body line by line and forwards the decoded events. A transport
/// fault drops any half-received tool calls instead of flushing them.
async fn forward_sse<S, B, E>(body: S, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut buffer: Vec<u8> = Vec::new();
    let mut state = SseState::default();

    while let Some(chunk_result) = body.next().await {
        match chunk_result {
            Ok(chunk) => {
                buffer.extend_from_slice(chunk.as_ref());

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);

                    for event in state.parse_sse_line(&line) {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                error!("Model stream interrupted: {}", e);
                state.abort();
                let _ = tx
                    .send(StreamEvent::Error(format!("Stream interrupted: {}", e)))
                    .await;
                return;
            }
        }
    }

    let mut events = state.parse_sse_line(&String::from_utf8_lossy(&buffer));
    events.extend(state.finish());
    for event in events {
        if tx.send(event).await.is_err() {
            return;
        }
    }
}

pub struct OpenAIProvider {
    client: reqwest::Client,
    name: String,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f64,
    stream: bool,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .read_timeout(std::time::Duration::from_secs(300))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            name: "openai".to_string(),
            api_key: api_key.into(),
            model: "gpt-4o".to_string(),
            base_url: OPENAI_BASE_URL.to_string(),
            temperature: 1.0,
            stream: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn convert_messages<'a>(&self, messages: &'a [ChatMessage]) -> Vec<ApiMessage<'a>> {
        messages
            .iter()
            .map(|m| {
                let tool_calls = m.tool_calls.as_ref().map(|calls| {
                    calls
                        .iter()
                        .map(|tc| ApiToolCallRequest {
                            id: &tc.id,
                            r#type: "function",
                            function: ApiFunctionRequest {
                                name: &tc.name,
                                arguments: &tc.arguments,
                            },
                        })
                        .collect()
                });

                // An assistant turn must carry content or tool calls.
                let content = match (m.content.as_deref(), &tool_calls) {
                    (None, None) => Some(""),
                    (content, _) => content,
                };

                ApiMessage {
                    role: m.role.as_str(),
                    content,
                    tool_calls,
                    tool_call_id: m.tool_call_id.as_deref(),
                }
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolSpec]) -> Vec<ApiTool<'_>> {
        tools
            .iter()
            .map(|t| ApiTool {
                r#type: "function",
                function: t,
            })
            .collect()
    }

    fn build_request<'a>(&'a self, request: ChatRequest<'a>) -> ApiRequest<'a> {
        ApiRequest {
            model: &self.model,
            messages: self.convert_messages(request.messages),
            tools: request.tools.map(Self::convert_tools),
            temperature: self.temperature,
            stream: self.stream,
            stream_options: self.stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn send(&self, body: &ApiRequest<'_>) -> anyhow::Result<reqwest::Response> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Request to {} failed: {}", self.base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "{} API error ({}): {}",
                self.name,
                status,
                error_text
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat_stream(
        &self,
        request: ChatRequest<'_>,
    ) -> anyhow::Result<BoxStream<'static, StreamEvent>> {
        let body = self.build_request(request);
        let response = self.send(&body).await?;

        if !self.stream {
            let completion: ChatCompletion = response.json().await?;
            let events = completion_events(completion)?;
            return Ok(futures_util::stream::iter(events).boxed());
        }

        let (tx, rx) = mpsc::channel::<StreamEvent>(256);

        tokio::spawn(forward_sse(response.bytes_stream(), tx));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
