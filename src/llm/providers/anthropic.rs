// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Anthropic Claude API provider implementation
//!
//! Implements the LlmProvider trait for the Messages API. Static system
//! blocks and the tool list are marked for prompt caching.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::settings::DEFAULT_ANTHROPIC_URL;
use crate::error::{classify_transport_error, AgentError, ApiError, Result};
use crate::llm::message::{Message, Role};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentBlockDelta, ContentBlockResponse, EventStream,
    LlmProvider, StopReason, StreamEvent, SystemBlock, ToolChoice, ToolDefinition, Usage,
};

use super::common::{
    parse_numeric_token_counts, parse_retry_after_seconds, server_error, LineBuffer,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Models offered by `/models`; the API has no cheap listing we rely on.
pub const KNOWN_MODELS: &[&str] = &[
    "claude-sonnet-4-20250514",
    "claude-haiku-4-20250414",
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
];

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_ANTHROPIC_URL)
    }

    /// Create with a custom base URL (scheme and host, without `/v1`)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Use a preconfigured HTTP client (timeouts, proxies)
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
    }

    /// Convert internal messages to Anthropic format.
    ///
    /// Tool results travel as `tool_result` blocks in user turns, and
    /// consecutive turns from the same side are merged since the API requires
    /// strict alternation.
    fn convert_messages(&self, messages: &[Message]) -> Vec<AnthropicMessage> {
        let mut converted: Vec<AnthropicMessage> = Vec::new();

        for message in messages.iter().filter(|m| m.sent_to_model()) {
            let (role, blocks) = match message.role {
                Role::User => (
                    "user",
                    text_block(&message.content).into_iter().collect::<Vec<_>>(),
                ),
                Role::Tool => (
                    "user",
                    vec![AnthropicContentBlock::ToolResult {
                        tool_use_id: message.tool_use_id.clone().unwrap_or_default(),
                        content: message.content.clone(),
                        is_error: message.is_error,
                    }],
                ),
                Role::Assistant => {
                    let mut blocks: Vec<_> = text_block(&message.content).into_iter().collect();
                    if let Some(call) = &message.tool_call {
                        blocks.push(AnthropicContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: call.object_arguments(),
                        });
                    }
                    ("assistant", blocks)
                }
            };

            if blocks.is_empty() {
                continue;
            }

            match converted.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => converted.push(AnthropicMessage {
                    role: role.to_string(),
                    content: blocks,
                }),
            }
        }

        converted
    }

    fn convert_system(&self, system: &[SystemBlock]) -> Vec<AnthropicSystemBlock> {
        system
            .iter()
            .filter(|b| !b.text.is_empty())
            .map(|b| AnthropicSystemBlock {
                block_type: "text",
                text: b.text.clone(),
                cache_control: b.cacheable.then(CacheControl::ephemeral),
            })
            .collect()
    }

    /// Convert tools to Anthropic format; the last one carries the cache marker
    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        let last = tools.len().saturating_sub(1);
        tools
            .iter()
            .enumerate()
            .map(|(i, t)| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters(),
                cache_control: (i == last).then(CacheControl::ephemeral),
            })
            .collect()
    }

    /// Build the request body
    fn build_request(&self, request: &CompletionRequest, stream: bool) -> AnthropicRequest {
        let (tools, tool_choice) = if request.tools.is_empty() {
            (None, None)
        } else {
            let choice = match &request.tool_choice {
                ToolChoice::Auto => AnthropicToolChoice::Auto {
                    disable_parallel_tool_use: true,
                },
                ToolChoice::None => AnthropicToolChoice::None,
                ToolChoice::Required => AnthropicToolChoice::Any {
                    disable_parallel_tool_use: true,
                },
                ToolChoice::Specific(name) => AnthropicToolChoice::Tool {
                    name: name.clone(),
                    disable_parallel_tool_use: true,
                },
            };
            (Some(self.convert_tools(&request.tools)), Some(choice))
        };

        AnthropicRequest {
            model: request.model.clone(),
            messages: self.convert_messages(&request.messages),
            system: self.convert_system(&request.system),
            max_tokens: request.max_tokens,
            temperature: Some(request.temperature),
            tools,
            tool_choice,
            stream,
        }
    }

    /// Parse an error response
    fn parse_error(&self, status: u16, body: &str, retry_after: Option<u64>) -> AgentError {
        if status == 401 {
            return AgentError::Api(ApiError::AuthenticationFailed(
                "Anthropic API key is invalid. Check your ANTHROPIC_API_KEY.".to_string(),
            ));
        }

        let Ok(error_response) = serde_json::from_str::<AnthropicError>(body) else {
            if status == 429 {
                return AgentError::Api(ApiError::RateLimited(retry_after.unwrap_or(0) as u32));
            }
            return server_error(status, body);
        };

        let message = error_response.error.message;
        match error_response.error.error_type.as_str() {
            "authentication_error" => AgentError::Api(ApiError::AuthenticationFailed(message)),
            "rate_limit_error" => {
                AgentError::Api(ApiError::RateLimited(retry_after.unwrap_or(0) as u32))
            }
            "not_found_error" => AgentError::Api(ApiError::ModelNotFound(message)),
            "invalid_request_error"
                if message.contains("too long")
                    || (message.contains("tokens") && message.contains("maximum")) =>
            {
                let (current, limit) = parse_numeric_token_counts(&message);
                AgentError::Api(ApiError::ContextTooLong { current, limit })
            }
            "invalid_request_error" => AgentError::Api(ApiError::InvalidResponse(message)),
            "overloaded_error" => server_error(529, message),
            _ => server_error(status, message),
        }
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let body = self.build_request(request, stream);

        tracing::debug!(
            target: "mercury_agent::llm::anthropic",
            model = %request.model,
            messages = body.messages.len(),
            stream,
            "sending messages request"
        );

        let response = self
            .post("/v1/messages")
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

fn text_block(text: &str) -> Option<AnthropicContentBlock> {
    (!text.is_empty()).then(|| AnthropicContentBlock::Text {
        text: text.to_string(),
    })
}

fn parse_stop_reason(reason: &str) -> StopReason {
    match reason {
        "max_tokens" => StopReason::MaxTokens,
        "tool_use" => StopReason::ToolUse,
        "stop_sequence" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn is_available(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }
        match self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
        {
            Ok(response) => matches!(response.status().as_u16(), 200 | 403),
            Err(_) => false,
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(KNOWN_MODELS.iter().map(|m| m.to_string()).collect())
    }

    async fn supports_tools(&self, _model: &str) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let response = self.send(&request, false).await?;
        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Api(ApiError::InvalidResponse(e.to_string())))?;

        let content = api_response
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(ContentBlockResponse::Text { text }),
                AnthropicContentBlock::ToolUse { id, name, input } => {
                    Some(ContentBlockResponse::ToolUse { id, name, input })
                }
                AnthropicContentBlock::ToolResult { .. } | AnthropicContentBlock::Other => None,
            })
            .collect();

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content,
            stop_reason: api_response.stop_reason.as_deref().map(parse_stop_reason),
            usage: api_response.usage.into(),
            timings: None,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let response = self.send(&request, true).await?;

        let event_stream = response
            .bytes_stream()
            .scan(LineBuffer::default(), |buffer, result| {
                let events = match result {
                    Ok(bytes) => buffer
                        .push(&bytes)
                        .iter()
                        .filter_map(|line| line.strip_prefix("data:"))
                        .filter_map(|data| parse_sse_data(data.trim()))
                        .map(Ok)
                        .collect(),
                    Err(e) => vec![Err(AgentError::Api(ApiError::StreamError(e.to_string())))],
                };
                futures::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }
}

/// Parse the `data:` payload of one server-sent event. The payload's own
/// `type` field mirrors the `event:` line, so that line is not needed.
fn parse_sse_data(data: &str) -> Option<StreamEvent> {
    let parsed: serde_json::Value = serde_json::from_str(data).ok()?;

    match parsed["type"].as_str()? {
        "message_start" => {
            let message = &parsed["message"];
            let usage = serde_json::from_value::<AnthropicUsage>(message["usage"].clone())
                .ok()
                .map(Usage::from);
            Some(StreamEvent::MessageStart {
                id: message["id"].as_str().unwrap_or_default().to_string(),
                model: message["model"].as_str().unwrap_or_default().to_string(),
                usage,
            })
        }
        "content_block_start" => {
            let index = parsed["index"].as_u64()? as usize;
            let block = &parsed["content_block"];

            let content_block = match block["type"].as_str()? {
                "text" => ContentBlockResponse::Text {
                    text: block["text"].as_str().unwrap_or("").to_string(),
                },
                "tool_use" => ContentBlockResponse::ToolUse {
                    id: block["id"].as_str()?.to_string(),
                    name: block["name"].as_str()?.to_string(),
                    input: serde_json::Value::Object(serde_json::Map::new()),
                },
                _ => return None,
            };

            Some(StreamEvent::ContentBlockStart {
                index,
                content_block,
            })
        }
        "content_block_delta" => {
            let index = parsed["index"].as_u64()? as usize;
            let delta = &parsed["delta"];

            let delta = match delta["type"].as_str()? {
                "text_delta" => ContentBlockDelta::TextDelta {
                    text: delta["text"].as_str()?.to_string(),
                },
                "input_json_delta" => ContentBlockDelta::InputJsonDelta {
                    partial_json: delta["partial_json"].as_str()?.to_string(),
                },
                _ => return None,
            };

            Some(StreamEvent::ContentBlockDelta { index, delta })
        }
        "content_block_stop" => {
            let index = parsed["index"].as_u64()? as usize;
            Some(StreamEvent::ContentBlockStop { index })
        }
        "message_delta" => {
            let stop_reason = parsed["delta"]["stop_reason"]
                .as_str()
                .map(parse_stop_reason);
            let usage = serde_json::from_value::<AnthropicUsage>(parsed["usage"].clone())
                .ok()
                .map(Usage::from);

            Some(StreamEvent::MessageDelta {
                stop_reason,
                usage,
                timings: None,
            })
        }
        "message_stop" => Some(StreamEvent::MessageStop),
        "ping" => Some(StreamEvent::Ping),
        "error" => Some(StreamEvent::Error {
            error_type: parsed["error"]["type"]
                .as_str()
                .unwrap_or("unknown")
                .to_string(),
            message: parsed["error"]["message"]
                .as_str()
                .unwrap_or(data)
                .to_string(),
        }),
        _ => None,
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<AnthropicSystemBlock>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<AnthropicToolChoice>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize)]
struct AnthropicSystemBlock {
    #[serde(rename = "type")]
    block_type: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl CacheControl {
    fn ephemeral() -> Self {
        Self { kind: "ephemeral" }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Block types this agent does not use (e.g. thinking)
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicToolChoice {
    Auto { disable_parallel_tool_use: bool },
    Any { disable_parallel_tool_use: bool },
    Tool { name: String, disable_parallel_tool_use: bool },
    None,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    cache_creation_input_tokens: Option<u32>,
    cache_read_input_tokens: Option<u32>,
}

impl From<AnthropicUsage> for Usage {
    fn from(usage: AnthropicUsage) -> Self {
        Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_creation_input_tokens: usage.cache_creation_input_tokens.unwrap_or(0),
            cache_read_input_tokens: usage.cache_read_input_tokens.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::ToolCall;
    use crate::tools::tool_definitions;
    use futures::TryStreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new("test-key")
    }

    fn request_json(request: &CompletionRequest) -> serde_json::Value {
        serde_json::to_value(provider().build_request(request, true)).unwrap()
    }

    #[test]
    fn test_provider_defaults() {
        let provider = provider();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, "https://api.anthropic.com");
    }

    #[test]
    fn test_with_base_url_trims_slash() {
        let provider = AnthropicProvider::with_base_url("k", "http://localhost:8080/");
        assert_eq!(provider.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_system_blocks_marked_for_caching() {
        let request = CompletionRequest::new("claude-sonnet-4-20250514", vec![Message::user("hi")])
            .with_system(SystemBlock::cached("You are a Mercury live-coding assistant."))
            .with_system(SystemBlock::volatile("Currently playing piece:\n```\nset tempo 90\n```"));

        let body = request_json(&request);
        assert_eq!(body["system"][0]["cache_control"]["type"], "ephemeral");
        assert!(body["system"][1].get("cache_control").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_last_tool_cached_and_parallel_disabled() {
        let request = CompletionRequest::new("m", vec![Message::user("hi")])
            .with_tools(tool_definitions());

        let body = request_json(&request);
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 3);
        assert!(tools[0].get("cache_control").is_none());
        assert_eq!(tools[2]["cache_control"]["type"], "ephemeral");
        assert_eq!(tools[0]["input_schema"]["required"][0], "code");
        assert_eq!(body["tool_choice"]["type"], "auto");
        assert_eq!(body["tool_choice"]["disable_parallel_tool_use"], true);
    }

    #[test]
    fn test_no_tools_no_tool_choice() {
        let body = request_json(&CompletionRequest::new("m", vec![Message::user("hi")]));
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_convert_tool_round_trip_messages() {
        let call = ToolCall::new("toolu_1", "send_code", json!({"code": "set tempo 90"}));
        let messages = vec![
            Message::user("play something at 90 bpm"),
            Message::assistant_tool_call("Sure.", call),
            Message::tool_result("toolu_1", "Code sent to Mercury (1 lines).", false),
            Message::user("thanks"),
        ];

        let converted = provider().convert_messages(&messages);
        // The tool result and the following user text share one user turn.
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[1].role, "assistant");
        assert_eq!(converted[1].content.len(), 2);
        assert_eq!(converted[2].role, "user");
        assert_eq!(converted[2].content.len(), 2);

        let value = serde_json::to_value(&converted[2].content[0]).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert_eq!(value["tool_use_id"], "toolu_1");
        assert!(value.get("is_error").is_none());
    }

    #[test]
    fn test_convert_skips_failed_turn_notices() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant_error("Error: provider unavailable"),
            Message::user("again"),
        ];
        let converted = provider().convert_messages(&messages);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].content.len(), 2);
    }

    /// A tool call whose input stream was cut off before the JSON closed
    fn truncated_tool_call() -> ToolCall {
        let mut acc = crate::chat::streaming::StreamAccumulator::new();
        acc.process_event(StreamEvent::ContentBlockStart {
            index: 0,
            content_block: ContentBlockResponse::ToolUse {
                id: "toolu_cut".to_string(),
                name: "send_code".to_string(),
                input: json!({}),
            },
        });
        acc.process_event(StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentBlockDelta::InputJsonDelta {
                partial_json: "{\"code\": \"set tempo 90\nnew synth".to_string(),
            },
        });
        acc.process_event(StreamEvent::ContentBlockStop { index: 0 });
        let reply = acc.finish();
        let call = reply.tool_calls.into_iter().next().unwrap();
        assert!(call.arguments.is_string());
        call
    }

    fn malformed_transcript() -> Vec<Message> {
        vec![
            Message::user("play a pad"),
            Message::assistant_tool_call("", truncated_tool_call()),
            Message::tool_result("toolu_cut", "Error: malformed arguments for send_code", true),
        ]
    }

    #[test]
    fn test_malformed_tool_input_replayed_as_object() {
        let request = CompletionRequest::new("claude-test", malformed_transcript());
        let body = request_json(&request);
        let tool_use = &body["messages"][1]["content"][0];
        assert_eq!(tool_use["type"], "tool_use");
        assert!(tool_use["input"].is_object());
        assert_eq!(tool_use["input"]["_raw"], "{\"code\": \"set tempo 90\nnew synth");
        assert_eq!(body["messages"][2]["content"][0]["is_error"], true);
    }

    #[test]
    fn test_tool_error_result_flagged() {
        let messages = vec![Message::tool_result("t", "Error: refused", true)];
        let converted = provider().convert_messages(&messages);
        let value = serde_json::to_value(&converted[0].content[0]).unwrap();
        assert_eq!(value["is_error"], true);
    }

    #[test]
    fn test_parse_error_authentication() {
        let err = provider().parse_error(401, "{}", None);
        assert!(err.is_configuration());
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_parse_error_rate_limit_uses_retry_after() {
        let body = r#"{"error":{"type":"rate_limit_error","message":"slow down"}}"#;
        let err = provider().parse_error(429, body, Some(7));
        assert!(matches!(err, AgentError::Api(ApiError::RateLimited(7))));
    }

    #[test]
    fn test_parse_error_overloaded() {
        let body = r#"{"error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = provider().parse_error(529, body, None);
        assert!(matches!(
            err,
            AgentError::Api(ApiError::ServerError { status: 529, .. })
        ));
    }

    #[test]
    fn test_parse_error_context_too_long() {
        let body = r#"{"error":{"type":"invalid_request_error","message":"prompt is too long: 215300 tokens > 200000 maximum"}}"#;
        let err = provider().parse_error(400, body, None);
        assert!(matches!(
            err,
            AgentError::Api(ApiError::ContextTooLong {
                current: 215300,
                limit: 200000
            })
        ));
    }

    #[test]
    fn test_parse_sse_events() {
        let start = parse_sse_data(
            r#"{"type":"message_start","message":{"id":"msg_1","model":"claude","usage":{"input_tokens":1200,"output_tokens":1,"cache_read_input_tokens":1000}}}"#,
        );
        match start {
            Some(StreamEvent::MessageStart { id, usage, .. }) => {
                assert_eq!(id, "msg_1");
                let usage = usage.unwrap();
                assert_eq!(usage.input_tokens, 1200);
                assert_eq!(usage.cache_read_input_tokens, 1000);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let delta = parse_sse_data(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"code\":"}}"#,
        );
        assert!(matches!(
            delta,
            Some(StreamEvent::ContentBlockDelta {
                index: 1,
                delta: ContentBlockDelta::InputJsonDelta { .. }
            })
        ));

        let stop = parse_sse_data(
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":42}}"#,
        );
        match stop {
            Some(StreamEvent::MessageDelta {
                stop_reason, usage, ..
            }) => {
                assert_eq!(stop_reason, Some(StopReason::ToolUse));
                assert_eq!(usage.unwrap().output_tokens, 42);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert!(parse_sse_data("not json").is_none());
        assert!(parse_sse_data(r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking"}}"#).is_none());
    }

    #[tokio::test]
    async fn test_stream_against_mock_server() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude-sonnet-4-20250514\",\"usage\":{\"input_tokens\":10,\"output_tokens\":1}}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"send_code\",\"input\":{}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"code\\\": \\\"set tempo 90\\\"}\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":12}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let provider = AnthropicProvider::with_base_url("test-key", server.uri());
        let request = CompletionRequest::new("claude-sonnet-4-20250514", vec![Message::user("90 bpm")])
            .with_tools(tool_definitions());
        let events: Vec<StreamEvent> = provider
            .complete_stream(request)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(events.len(), 6);
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert!(matches!(events[5], StreamEvent::MessageStop));
    }

    #[tokio::test]
    async fn test_complete_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_2",
                "model": "claude-sonnet-4-20250514",
                "content": [
                    {"type": "text", "text": "Silencing."},
                    {"type": "tool_use", "id": "toolu_2", "name": "silence", "input": {}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 5, "output_tokens": 3}
            })))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::with_base_url("test-key", server.uri());
        let response = provider
            .complete(CompletionRequest::new("claude-sonnet-4-20250514", vec![Message::user("stop")]))
            .await
            .unwrap();

        assert_eq!(response.content.len(), 2);
        assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(response.usage.total_tokens(), 8);
    }

    #[tokio::test]
    async fn test_unauthorized_is_configuration_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::with_base_url("bad", server.uri());
        let err = match provider
            .complete_stream(CompletionRequest::new("m", vec![Message::user("hi")]))
            .await
        {
            Err(e) => e,
            Ok(_) => panic!("expected an authentication error"),
        };
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_is_available_accepts_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::with_base_url("key", server.uri());
        assert!(provider.is_available().await);
        assert!(!AnthropicProvider::with_base_url("", server.uri()).is_available().await);
    }
}
