// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Ollama provider for local models
//!
//! Talks to `/api/chat` with NDJSON streaming. Tool support is probed per
//! model through `/api/show` and cached.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::settings::DEFAULT_OLLAMA_HOST;
use crate::error::{AgentError, ApiError, Result};
use crate::llm::message::{Message, Role};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentBlockDelta, ContentBlockResponse, EventStream,
    LlmProvider, StopReason, StreamEvent, Timings, ToolDefinition, Usage,
};

use super::common::{server_error, LineBuffer};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Ollama provider
pub struct OllamaProvider {
    client: Client,
    host: String,
    tool_support: Mutex<HashMap<String, bool>>,
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaProvider {
    /// Create a provider for the default local host
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_OLLAMA_HOST)
    }

    /// Create with a custom host
    pub fn with_base_url(host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
            tool_support: Mutex::new(HashMap::new()),
        }
    }

    /// Use a preconfigured HTTP client (timeouts, proxies)
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn not_running(&self) -> AgentError {
        AgentError::Api(ApiError::Network(format!(
            "Ollama is not running at {}. Start the Ollama app or run 'ollama serve'",
            self.host
        )))
    }

    fn map_transport_error(&self, err: reqwest::Error) -> AgentError {
        if err.is_connect() {
            self.not_running()
        } else if err.is_timeout() {
            AgentError::Api(ApiError::Timeout)
        } else {
            AgentError::Http(err)
        }
    }

    /// Convert internal messages to Ollama chat format
    fn convert_messages(&self, messages: &[Message], system: Option<String>) -> Vec<OllamaMessage> {
        let mut result = Vec::with_capacity(messages.len() + 1);

        if let Some(system) = system {
            result.push(OllamaMessage {
                role: "system".to_string(),
                content: system,
                tool_calls: None,
            });
        }

        for message in messages.iter().filter(|m| m.sent_to_model()) {
            result.push(OllamaMessage {
                role: message.role.as_str().to_string(),
                content: message.content.clone(),
                tool_calls: match (message.role, &message.tool_call) {
                    (Role::Assistant, Some(call)) => Some(vec![OllamaToolCall {
                        id: None,
                        function: OllamaFunctionCall {
                            name: call.name.clone(),
                            arguments: call.object_arguments(),
                        },
                    }]),
                    _ => None,
                },
            });
        }

        result
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<OllamaTool> {
        tools
            .iter()
            .map(|t| OllamaTool {
                tool_type: "function".to_string(),
                function: OllamaFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters(),
                },
            })
            .collect()
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            messages: self.convert_messages(&request.messages, request.system_text()),
            stream,
            tools: (!request.tools.is_empty()).then(|| self.convert_tools(&request.tools)),
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }

    fn parse_error(&self, status: u16, body: &str, model: &str) -> AgentError {
        let message = serde_json::from_str::<OllamaError>(body)
            .map(|e| e.error)
            .unwrap_or_else(|_| body.to_string());

        if status == 404 {
            return AgentError::Api(ApiError::ModelNotFound(format!(
                "Model '{}' not found in Ollama. Pull it first: ollama pull {}",
                model, model
            )));
        }
        server_error(status, message)
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let body = self.build_request(request, stream);

        tracing::debug!(
            target: "mercury_agent::llm::ollama",
            model = %request.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            stream,
            "sending chat request"
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status, &body, &request.model));
        }

        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.host))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(server_error(status, body));
        }

        let tags: OllamaTagsResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Api(ApiError::InvalidResponse(e.to_string())))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn supports_tools(&self, model: &str) -> bool {
        if let Some(known) = self
            .tool_support
            .lock()
            .ok()
            .and_then(|cache| cache.get(model).copied())
        {
            return known;
        }

        let supported = match self
            .client
            .post(format!("{}/api/show", self.host))
            .json(&serde_json::json!({ "name": model }))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response
                .json::<OllamaShowResponse>()
                .await
                .map(|show| {
                    show.template.to_lowercase().contains("tools")
                        || show.model_info.to_string().to_lowercase().contains("tool")
                })
                .unwrap_or(false),
            Ok(_) => false,
            Err(e) => {
                // Not cached; the daemon may simply not be up yet.
                tracing::debug!(
                    target: "mercury_agent::llm::ollama",
                    model,
                    error = %e,
                    "could not probe tool support"
                );
                return false;
            }
        };

        tracing::debug!(
            target: "mercury_agent::llm::ollama",
            model,
            supported,
            "probed tool support"
        );
        if let Ok(mut cache) = self.tool_support.lock() {
            cache.insert(model.to_string(), supported);
        }
        supported
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let response = self.send(&request, false).await?;
        let chunk: OllamaChunk = response
            .json()
            .await
            .map_err(|e| AgentError::Api(ApiError::InvalidResponse(e.to_string())))?;

        if let Some(error) = chunk.error {
            return Err(server_error(500, error));
        }

        let mut content = Vec::new();
        if !chunk.message.content.is_empty() {
            content.push(ContentBlockResponse::Text {
                text: chunk.message.content.clone(),
            });
        }
        let has_tools = chunk.message.tool_calls.is_some();
        for call in chunk.message.tool_calls.clone().unwrap_or_default() {
            content.push(ContentBlockResponse::ToolUse {
                id: call.id.unwrap_or_else(generated_call_id),
                name: call.function.name,
                input: normalize_arguments(call.function.arguments),
            });
        }

        Ok(CompletionResponse {
            id: format!("ollama-{}", uuid::Uuid::new_v4()),
            model: chunk.model.clone().unwrap_or_else(|| request.model.clone()),
            stop_reason: Some(chunk.stop_reason(has_tools)),
            usage: chunk.usage(),
            timings: Some(chunk.timings()),
            content,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let response = self.send(&request, true).await?;
        let translator = NdjsonTranslator::new(request.model.clone());

        let event_stream = response
            .bytes_stream()
            .scan(translator, |translator, result| {
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

fn generated_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4())
}

/// Some models send arguments as a JSON-encoded string
fn normalize_arguments(arguments: serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::String(raw) => {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        }
        other => other,
    }
}

/// Translates NDJSON chat chunks into normalized stream events.
///
/// Text is block 0; tool calls take the following indices.
#[derive(Debug)]
struct NdjsonTranslator {
    lines: LineBuffer,
    message_id: String,
    model: String,
    started: bool,
    text_open: bool,
    tool_calls: usize,
}

impl NdjsonTranslator {
    fn new(model: String) -> Self {
        Self {
            lines: LineBuffer::default(),
            message_id: format!("ollama-{}", uuid::Uuid::new_v4()),
            model,
            started: false,
            text_open: false,
            tool_calls: 0,
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent>> {
        let mut events = Vec::new();
        for line in self.lines.push(bytes) {
            match serde_json::from_str::<OllamaChunk>(&line) {
                Ok(chunk) => self.translate(chunk, &mut events),
                Err(e) => tracing::debug!(
                    target: "mercury_agent::llm::ollama",
                    error = %e,
                    "skipping unparseable stream line"
                ),
            }
        }
        events
    }

    fn translate(&mut self, chunk: OllamaChunk, events: &mut Vec<Result<StreamEvent>>) {
        if !self.started {
            self.started = true;
            events.push(Ok(StreamEvent::MessageStart {
                id: self.message_id.clone(),
                model: chunk.model.clone().unwrap_or_else(|| self.model.clone()),
                usage: None,
            }));
        }

        if let Some(error) = &chunk.error {
            events.push(Ok(StreamEvent::Error {
                error_type: "ollama_error".to_string(),
                message: error.clone(),
            }));
            return;
        }

        if !chunk.message.content.is_empty() {
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
                delta: ContentBlockDelta::TextDelta {
                    text: chunk.message.content.clone(),
                },
            }));
        }

        for call in chunk.message.tool_calls.clone().unwrap_or_default() {
            self.tool_calls += 1;
            let index = self.tool_calls;
            let partial_json = match call.function.arguments {
                serde_json::Value::String(raw) => raw,
                other => other.to_string(),
            };
            events.push(Ok(StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlockResponse::ToolUse {
                    id: call.id.unwrap_or_else(generated_call_id),
                    name: call.function.name,
                    input: serde_json::Value::Object(serde_json::Map::new()),
                },
            }));
            events.push(Ok(StreamEvent::ContentBlockDelta {
                index,
                delta: ContentBlockDelta::InputJsonDelta { partial_json },
            }));
            events.push(Ok(StreamEvent::ContentBlockStop { index }));
        }

        if chunk.done {
            if std::mem::take(&mut self.text_open) {
                events.push(Ok(StreamEvent::ContentBlockStop { index: 0 }));
            }
            events.push(Ok(StreamEvent::MessageDelta {
                stop_reason: Some(chunk.stop_reason(self.tool_calls > 0)),
                usage: Some(chunk.usage()),
                timings: Some(chunk.timings()),
            }));
            events.push(Ok(StreamEvent::MessageStop));
        }
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OllamaTool>>,
    options: OllamaOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OllamaFunction,
}

#[derive(Debug, Serialize)]
struct OllamaFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: OllamaFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// A response line (streaming) or the whole response (non-streaming)
#[derive(Debug, Default, Deserialize)]
struct OllamaChunk {
    model: Option<String>,
    #[serde(default)]
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    total_duration: u64,
    #[serde(default)]
    load_duration: u64,
    #[serde(default)]
    prompt_eval_duration: u64,
    #[serde(default)]
    eval_duration: u64,
    error: Option<String>,
}

impl OllamaChunk {
    fn stop_reason(&self, has_tool_calls: bool) -> StopReason {
        if has_tool_calls {
            return StopReason::ToolUse;
        }
        match self.done_reason.as_deref() {
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        }
    }

    fn usage(&self) -> Usage {
        Usage {
            input_tokens: self.prompt_eval_count,
            output_tokens: self.eval_count,
            ..Usage::default()
        }
    }

    fn timings(&self) -> Timings {
        Timings {
            prompt_eval_ms: self.prompt_eval_duration as f64 / NANOS_PER_MILLI,
            eval_ms: self.eval_duration as f64 / NANOS_PER_MILLI,
            total_ms: self.total_duration as f64 / NANOS_PER_MILLI,
            load_ms: self.load_duration as f64 / NANOS_PER_MILLI,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OllamaShowResponse {
    #[serde(default)]
    template: String,
    #[serde(default)]
    model_info: serde_json::Value,
}
