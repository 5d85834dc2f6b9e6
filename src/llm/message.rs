// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for LLM interactions
//!
//! A transcript is an ordered list of [`Message`]s. Assistant messages may
//! carry a single [`ToolCall`]; tool messages carry the id of the call they
//! answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the message
    pub id: Uuid,

    /// Role of the message sender
    pub role: Role,

    /// Text content (may be empty when a tool call is present)
    pub content: String,

    /// Tool call requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,

    /// Tool use ID if this is a tool result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,

    /// Whether this message reports a failure
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,

    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Result of a tool call
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A structured request from the model to invoke one of the fixed tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id matching the eventual tool result
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments as produced by the model
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Arguments as a JSON object for replay to a provider.
    ///
    /// Input that never parsed into an object is wrapped as `{"_raw": ...}`
    /// so the request stays valid and the model can still see what it sent.
    pub fn object_arguments(&self) -> serde_json::Value {
        match &self.arguments {
            serde_json::Value::Object(_) => self.arguments.clone(),
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            serde_json::Value::String(raw) => serde_json::json!({ "_raw": raw }),
            other => serde_json::json!({ "_raw": other.to_string() }),
        }
    }
}

impl Message {
    fn new(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            tool_call: None,
            tool_use_id: None,
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    /// Create an assistant message that requests a tool call
    pub fn assistant_tool_call(content: impl Into<String>, call: ToolCall) -> Self {
        let mut message = Self::new(Role::Assistant, content.into());
        message.tool_call = Some(call);
        message
    }

    /// Create an assistant message describing a failed turn
    pub fn assistant_error(content: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Assistant, content.into());
        message.is_error = true;
        message
    }

    /// Create a tool result message
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        let mut message = Self::new(Role::Tool, content.into());
        message.tool_use_id = Some(tool_use_id.into());
        message.is_error = is_error;
        message
    }

    /// Rough token estimate (~4 characters per token)
    pub fn estimated_tokens(&self) -> usize {
        let call_len = self
            .tool_call
            .as_ref()
            .map(|c| c.name.len() + c.arguments.to_string().len())
            .unwrap_or(0);
        (self.content.len() + call_len) / 4
    }

    pub fn has_tool_call(&self) -> bool {
        self.tool_call.is_some()
    }

    /// Failed-turn notices stay in the transcript but are not replayed to
    /// providers.
    pub fn sent_to_model(&self) -> bool {
        !(self.role == Role::Assistant && self.is_error)
    }
}
