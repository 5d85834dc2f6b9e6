// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible chat completions provider
//!
//! Serves both OpenAI and OpenRouter. The two differ only in base URL,
//! reported name and OpenRouter's attribution headers.

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::settings::{DEFAULT_OPENAI_URL, DEFAULT_OPENROUTER_URL};
use crate::error::{classify_transport_error, AgentError, ApiError, Result};
use crate::llm::message::{Message, Role};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentBlockDelta, ContentBlockResponse, EventStream,
    LlmProvider, StopReason, StreamEvent, ToolChoice, ToolDefinition, Usage,
};

use super::common::{
    parse_numeric_token_counts, parse_retry_after_seconds, server_error, LineBuffer,
};

const ATTRIBUTION_URL: &str = "https://github.com/tmhglnd/mercury-playground";
const ATTRIBUTION_TITLE: &str = "Mercury Agent";

/// Which OpenAI-compatible service is being spoken to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiFlavor {
    OpenAi,
    OpenRouter,
}

impl OpenAiFlavor {
    pub fn name(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "openai",
            OpenAiFlavor::OpenRouter => "openrouter",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => DEFAULT_OPENAI_URL,
            OpenAiFlavor::OpenRouter => DEFAULT_OPENROUTER_URL,
        }
    }
}

/// Provider for any `/chat/completions` endpoint
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_key: String,
    base_url: String,
    flavor: OpenAiFlavor,
}

impl OpenAiCompatibleProvider {
    /// Create a provider against the flavor's default endpoint
    pub fn new(flavor: OpenAiFlavor, api_key: impl Into<String>) -> Self {
        Self::with_base_url(flavor, api_key, flavor.default_base_url())
    }

    /// Create with a custom base URL (up to and including `/v1`)
    pub fn with_base_url(
        flavor: OpenAiFlavor,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            flavor,
        }
    }

    /// Use a preconfigured HTTP client (timeouts, proxies)
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        match self.flavor {
            OpenAiFlavor::OpenRouter => builder
                .header("HTTP-Referer", ATTRIBUTION_URL)
                .header("X-Title", ATTRIBUTION_TITLE),
            OpenAiFlavor::OpenAi => builder,
        }
    }

    /// Convert internal messages to chat-completions format
    fn convert_messages(&self, messages: &[Message], system: Option<String>) -> Vec<ChatMessage> {
        let mut result = Vec::with_capacity(messages.len() + 1);

        if let Some(system) = system {
            result.push(ChatMessage {
                role: "system".to_string(),
                content: Some(system),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for message in messages.iter().filter(|m| m.sent_to_model()) {
            let converted = match message.role {
                Role::User => ChatMessage {
                    role: "user".to_string(),
                    content: Some(message.content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Role::Assistant => ChatMessage {
                    role: "assistant".to_string(),
                    content: (!message.content.is_empty()).then(|| message.content.clone()),
                    tool_calls: message.tool_call.as_ref().map(|call| {
                        vec![ChatToolCall {
                            id: call.id.clone(),
                            call_type: "function".to_string(),
                            function: ChatFunctionCall {
                                name: call.name.clone(),
                                arguments: call.object_arguments().to_string(),
                            },
                        }]
                    }),
                    tool_call_id: None,
                },
                Role::Tool => ChatMessage {
                    role: "tool".to_string(),
                    content: Some(message.content.clone()),
                    tool_calls: None,
                    tool_call_id: message.tool_use_id.clone(),
                },
            };
            result.push(converted);
        }

        result
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<ChatTool> {
        tools
            .iter()
            .map(|t| ChatTool {
                tool_type: "function".to_string(),
                function: ChatFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters(),
                },
            })
            .collect()
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> ChatRequest {
        let has_tools = !request.tools.is_empty();
        let tool_choice = has_tools.then(|| match &request.tool_choice {
            ToolChoice::Auto => serde_json::json!("auto"),
            ToolChoice::None => serde_json::json!("none"),
            ToolChoice::Required => serde_json::json!("required"),
            ToolChoice::Specific(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
        });

        ChatRequest {
            model: request.model.clone(),
            messages: self.convert_messages(&request.messages, request.system_text()),
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
            tools: has_tools.then(|| self.convert_tools(&request.tools)),
            tool_choice,
            parallel_tool_calls: has_tools.then_some(false),
            stream,
            stream_options: stream.then(|| StreamOptions {
                include_usage: true,
            }),
        }
    }

    fn parse_error(&self, status: u16, body: &str, retry_after: Option<u64>) -> AgentError {
        let message = serde_json::from_str::<ChatError>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.to_string());

        match status {
            401 => AgentError::Api(ApiError::AuthenticationFailed(format!(
                "{} API key is invalid. Check your API key.",
                self.flavor.name()
            ))),
            429 => AgentError::Api(ApiError::RateLimited(retry_after.unwrap_or(0) as u32)),
            404 => AgentError::Api(ApiError::ModelNotFound(message)),
            400 if message.contains("context length") || message.contains("maximum context") => {
                let (current, limit) = parse_numeric_token_counts(&message);
                AgentError::Api(ApiError::ContextTooLong { current, limit })
            }
            _ => server_error(status, message),
        }
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let body = self.build_request(request, stream);

        tracing::debug!(
            target: "mercury_agent::llm::openai",
            provider = self.flavor.name(),
            model = %request.model,
            messages = body.messages.len(),
            stream,
            "sending chat completion request"
        );

        let response = self
            .authorized(
                self.client
                    .post(format!("{}/chat/completions", self.base_url)),
            )
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = parse_retry_after_seconds(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status, &body, retry_after));
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.flavor.name()
    }

    async fn is_available(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }
        match self
            .authorized(self.client.get(format!("{}/models", self.base_url)))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .authorized(self.client.get(format!("{}/models", self.base_url)))
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status, &body, None));
        }

        let listing: ModelListing = response
            .json()
            .await
            .map_err(|e| AgentError::Api(ApiError::InvalidResponse(e.to_string())))?;
        let mut ids: Vec<String> = listing.data.into_iter().map(|m| m.id).collect();
        ids.sort();
        Ok(ids)
    }

    async fn supports_tools(&self, _model: &str) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let response = self.send(&request, false).await?;
        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Api(ApiError::InvalidResponse(e.to_string())))?;

        let choice = api_response.choices.into_iter().next().ok_or_else(|| {
            AgentError::Api(ApiError::InvalidResponse("response has no choices".to_string()))
        })?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            content.push(ContentBlockResponse::Text { text });
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            content.push(ContentBlockResponse::ToolUse {
                id: call.id,
                name: call.function.name,
                input: parse_arguments(&call.function.arguments),
            });
        }

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content,
            stop_reason: choice
                .finish_reason
                .as_deref()
                .map(StopReason::from_finish_reason),
            usage: api_response.usage.map(Usage::from).unwrap_or_default(),
            timings: None,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let response = self.send(&request, true).await?;

        let event_stream = response
            .bytes_stream()
            .scan(ChunkTranslator::default(), |translator, result| {
                let events = match result {
                    Ok(bytes) => translator.push(&bytes),
                    Err(e) => vec![Err(AgentError::Api(ApiError::StreamError(e.to_string())))],
                };
                futures::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

/// Complete tool arguments. Malformed JSON is kept as a raw string so the
/// dispatcher reports it back to the model.
fn parse_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| serde_json::Value::String(arguments.to_string()))
}

/// Translates chat-completion chunks into normalized stream events.
///
/// Text is block 0; tool call `i` is block `i + 1`.
#[derive(Debug, Default)]
struct ChunkTranslator {
    lines: LineBuffer,
    started: bool,
    text_open: bool,
    open_tools: BTreeSet<usize>,
}

impl ChunkTranslator {
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent>> {
        let mut events = Vec::new();
        for line in self.lines.push(bytes) {
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                continue;
            };
            if data == "[DONE]" {
                self.close_blocks(&mut events);
                events.push(Ok(StreamEvent::MessageStop));
                continue;
            }
            match serde_json::from_str::<ChatStreamChunk>(data) {
                Ok(chunk) => self.translate(chunk, &mut events),
                Err(e) => tracing::debug!(
                    target: "mercury_agent::llm::openai",
                    error = %e,
                    "skipping unparseable stream chunk"
                ),
            }
        }
        events
    }

    fn translate(&mut self, chunk: ChatStreamChunk, events: &mut Vec<Result<StreamEvent>>) {
        if !self.started {
            self.started = true;
            events.push(Ok(StreamEvent::MessageStart {
                id: chunk.id.clone().unwrap_or_default(),
                model: chunk.model.clone().unwrap_or_default(),
                usage: None,
            }));
        }

        if let Some(error) = chunk.error {
            events.push(Ok(StreamEvent::Error {
                error_type: error.code.map(|c| c.to_string()).unwrap_or_else(|| "api_error".to_string()),
                message: error.message,
            }));
            return;
        }

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                if !self.text_open {
                    self.text_open = true;
                    events.push(Ok(StreamEvent::ContentBlockStart {
                        index: 0,
                        content_block: ContentBlockResponse::Text {
                            text: String::new(),
                        },
                    }));
                }
                events.push(Ok(StreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: ContentBlockDelta::TextDelta { text },
                }));
            }

            for call in choice.delta.tool_calls.unwrap_or_default() {
                let slot = call.index.unwrap_or(0);
                let index = slot + 1;
                let function = call.function.unwrap_or_default();

                if self.open_tools.insert(slot) {
                    events.push(Ok(StreamEvent::ContentBlockStart {
                        index,
                        content_block: ContentBlockResponse::ToolUse {
                            id: call
                                .id
                                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4())),
                            name: function.name.clone().unwrap_or_default(),
                            input: serde_json::Value::Object(serde_json::Map::new()),
                        },
                    }));
                }

                if let Some(arguments) = function.arguments.filter(|a| !a.is_empty()) {
                    events.push(Ok(StreamEvent::ContentBlockDelta {
                        index,
                        delta: ContentBlockDelta::InputJsonDelta {
                            partial_json: arguments,
                        },
                    }));
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.close_blocks(events);
                events.push(Ok(StreamEvent::MessageDelta {
                    stop_reason: Some(StopReason::from_finish_reason(&reason)),
                    usage: None,
                    timings: None,
                }));
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(Ok(StreamEvent::MessageDelta {
                stop_reason: None,
                usage: Some(usage.into()),
                timings: None,
            }));
        }
    }

    fn close_blocks(&mut self, events: &mut Vec<Result<StreamEvent>>) {
        if std::mem::take(&mut self.text_open) {
            events.push(Ok(StreamEvent::ContentBlockStop { index: 0 }));
        }
        for slot in std::mem::take(&mut self.open_tools) {
            events.push(Ok(StreamEvent::ContentBlockStop { index: slot + 1 }));
        }
    }
}

// Chat completions wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: ChatFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl From<ChatUsage> for Usage {
    fn from(usage: ChatUsage) -> Self {
        Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            ..Usage::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatError {
    error: ChatErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ChatErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ModelListing {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// Streaming types
#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    usage: Option<ChatUsage>,
    error: Option<ChatErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ChatStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<ChatStreamFunction>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}
