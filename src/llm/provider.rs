// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM Provider trait and related types
//!
//! Defines the normalized request/response shape shared by every backend.
//! Providers translate it to their own wire format and back.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::llm::message::Message;

/// Boxed stream of provider events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Main trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "anthropic", "ollama")
    fn name(&self) -> &str;

    /// Check whether the backend is reachable with the configured credentials
    async fn is_available(&self) -> bool;

    /// List model identifiers the backend offers
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Whether the given model accepts tool definitions
    async fn supports_tools(&self, model: &str) -> bool;

    /// Non-streaming completion
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Streaming completion
    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream>;
}

/// A block of system instructions
#[derive(Debug, Clone, PartialEq)]
pub struct SystemBlock {
    pub text: String,
    /// Static content that providers with prompt caching may cache
    pub cacheable: bool,
}

impl SystemBlock {
    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cacheable: true,
        }
    }

    pub fn volatile(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cacheable: false,
        }
    }
}

/// Request for completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// System instructions, in order
    pub system: Vec<SystemBlock>,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Tools available for the model to use
    pub tools: Vec<ToolDefinition>,
    /// How to handle tool choice
    pub tool_choice: ToolChoice,
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Response ID
    pub id: String,
    /// Model used
    pub model: String,
    /// Response content
    pub content: Vec<ContentBlockResponse>,
    /// Stop reason
    pub stop_reason: Option<StopReason>,
    /// Token usage
    pub usage: Usage,
    /// Server-side timings, when the backend reports them
    pub timings: Option<Timings>,
}

/// A content block in the response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockResponse {
    /// Text content
    Text { text: String },
    /// Tool use request
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of message
    EndTurn,
    /// Hit max tokens
    MaxTokens,
    /// Wants to use a tool
    ToolUse,
    /// Stop sequence hit
    StopSequence,
}

impl StopReason {
    /// Map OpenAI-style `finish_reason` strings
    pub fn from_finish_reason(reason: &str) -> Self {
        match reason {
            "length" => StopReason::MaxTokens,
            "tool_calls" | "function_call" => StopReason::ToolUse,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Input tokens
    pub input_tokens: u32,
    /// Output tokens
    pub output_tokens: u32,
    /// Cache creation tokens (if caching enabled)
    #[serde(default)]
    pub cache_creation_input_tokens: u32,
    /// Cache read tokens (if caching enabled)
    #[serde(default)]
    pub cache_read_input_tokens: u32,
}

impl Usage {
    /// Get total tokens used
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// Fold a later usage report into this one, keeping the larger counts.
    ///
    /// Anthropic reports input tokens on `message_start` and output tokens on
    /// `message_delta`.
    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens = self.input_tokens.max(other.input_tokens);
        self.output_tokens = self.output_tokens.max(other.output_tokens);
        self.cache_creation_input_tokens = self
            .cache_creation_input_tokens
            .max(other.cache_creation_input_tokens);
        self.cache_read_input_tokens = self
            .cache_read_input_tokens
            .max(other.cache_read_input_tokens);
    }
}

/// Server-reported generation timings in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub prompt_eval_ms: f64,
    pub eval_ms: f64,
    pub total_ms: f64,
    pub load_ms: f64,
}

/// Events from a streaming response
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Start of message
    MessageStart {
        id: String,
        model: String,
        usage: Option<Usage>,
    },
    /// Start of a content block
    ContentBlockStart {
        index: usize,
        content_block: ContentBlockResponse,
    },
    /// Delta to a content block
    ContentBlockDelta {
        index: usize,
        delta: ContentBlockDelta,
    },
    /// End of a content block
    ContentBlockStop { index: usize },
    /// Message delta (stop reason, usage, timings)
    MessageDelta {
        stop_reason: Option<StopReason>,
        usage: Option<Usage>,
        timings: Option<Timings>,
    },
    /// End of message
    MessageStop,
    /// Ping (keep-alive)
    Ping,
    /// Error
    Error { error_type: String, message: String },
}

/// Delta update to a content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockDelta {
    /// Text delta
    TextDelta { text: String },
    /// Partial JSON for tool input
    InputJsonDelta { partial_json: String },
}

/// Tool definition for the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// Input schema (JSON Schema)
    pub input_schema: ToolInputSchema,
}

/// Input schema for a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Schema type (always "object")
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Property definitions
    pub properties: serde_json::Value,
    /// Required properties
    #[serde(default)]
    pub required: Vec<String>,
}

impl ToolDefinition {
    /// JSON Schema object for OpenAI-style `parameters` fields
    pub fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.input_schema.schema_type,
            "properties": self.input_schema.properties,
            "required": self.input_schema.required,
        })
    }
}

/// How the model should choose to use tools
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ToolChoice {
    /// Let the model decide
    #[default]
    Auto,
    /// Don't use any tools
    None,
    /// Must use a tool
    Required,
    /// Use a specific tool
    Specific(String),
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: vec![],
            max_tokens: 4096,
            temperature: 0.7,
            tools: vec![],
            tool_choice: ToolChoice::Auto,
        }
    }

    /// Append a system block
    pub fn with_system(mut self, block: SystemBlock) -> Self {
        self.system.push(block);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set tools
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Set tool choice
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    /// All system blocks joined, for providers without block support
    pub fn system_text(&self) -> Option<String> {
        if self.system.is_empty() {
            return None;
        }
        Some(
            self.system
                .iter()
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_new() {
        let request = CompletionRequest::new("llama3", vec![Message::user("Hello")]);
        assert_eq!(request.model, "llama3");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.max_tokens, 4096);
        assert!(request.system.is_empty());
        assert!(request.tools.is_empty());
        assert_eq!(request.tool_choice, ToolChoice::Auto);
    }

    #[test]
    fn test_system_blocks_keep_order_and_cache_flag() {
        let request = CompletionRequest::new("m", vec![])
            .with_system(SystemBlock::cached("preamble"))
            .with_system(SystemBlock::volatile("Currently playing piece"));

        assert!(request.system[0].cacheable);
        assert!(!request.system[1].cacheable);
        assert_eq!(
            request.system_text().as_deref(),
            Some("preamble\n\nCurrently playing piece")
        );
    }

    #[test]
    fn test_system_text_none_when_empty() {
        assert!(CompletionRequest::new("m", vec![]).system_text().is_none());
    }

    #[test]
    fn test_stop_reason_from_finish_reason() {
        assert_eq!(StopReason::from_finish_reason("stop"), StopReason::EndTurn);
        assert_eq!(StopReason::from_finish_reason("length"), StopReason::MaxTokens);
        assert_eq!(StopReason::from_finish_reason("tool_calls"), StopReason::ToolUse);
        assert_eq!(StopReason::from_finish_reason("weird"), StopReason::EndTurn);
    }

    #[test]
    fn test_usage_merge() {
        let mut usage = Usage {
            input_tokens: 1200,
            cache_read_input_tokens: 1000,
            ..Usage::default()
        };
        usage.merge(&Usage {
            output_tokens: 80,
            ..Usage::default()
        });
        assert_eq!(usage.input_tokens, 1200);
        assert_eq!(usage.output_tokens, 80);
        assert_eq!(usage.cache_read_input_tokens, 1000);
        assert_eq!(usage.total_tokens(), 1280);
    }

    #[test]
    fn test_tool_definition_parameters() {
        let def = ToolDefinition {
            name: "send_code".to_string(),
            description: "d".to_string(),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties: serde_json::json!({"code": {"type": "string"}}),
                required: vec!["code".to_string()],
            },
        };
        let params = def.parameters();
        assert_eq!(params["type"], "object");
        assert_eq!(params["required"][0], "code");
    }

    #[test]
    fn test_content_block_serde() {
        let block = ContentBlockResponse::ToolUse {
            id: "t1".to_string(),
            name: "silence".to_string(),
            input: serde_json::json!({}),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_use");
    }
}
