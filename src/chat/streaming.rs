// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response handling
//!
//! Folds provider [`StreamEvent`]s into one assembled assistant reply. Blocks
//! are keyed by the index the provider assigns, so interleaved deltas for
//! text and tool input land in the right place.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::llm::message::ToolCall;
use crate::llm::provider::{
    ContentBlockDelta, ContentBlockResponse, StopReason, StreamEvent, Timings, Usage,
};

#[derive(Debug)]
enum PartialBlock {
    Text(String),
    Tool {
        id: String,
        name: String,
        input: Value,
        json: String,
    },
}

/// Accumulator for streaming response content
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    blocks: BTreeMap<usize, PartialBlock>,
    stop_reason: Option<StopReason>,
    usage: Usage,
    timings: Option<Timings>,
    model: Option<String>,
    has_text_output: bool,
}

/// The assistant reply assembled from a stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledReply {
    pub text: String,
    /// Tool calls in block order
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
    pub timings: Option<Timings>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn has_text_output(&self) -> bool {
        self.has_text_output
    }

    /// Model name reported by the provider, if any
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Process a stream event and return what the caller may display
    pub fn process_event(&mut self, event: StreamEvent) -> StreamEventResult {
        match event {
            StreamEvent::MessageStart { model, usage, .. } => {
                if !model.is_empty() {
                    self.model = Some(model);
                }
                if let Some(usage) = usage {
                    self.usage.merge(&usage);
                }
                StreamEventResult::MessageStart
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let block = match content_block {
                    ContentBlockResponse::Text { text } => PartialBlock::Text(text),
                    ContentBlockResponse::ToolUse { id, name, input } => PartialBlock::Tool {
                        id,
                        name,
                        input,
                        json: String::new(),
                    },
                };
                self.blocks.insert(index, block);
                StreamEventResult::BlockStarted
            }
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentBlockDelta::TextDelta { text } => {
                    if text.is_empty() {
                        return StreamEventResult::Ignored;
                    }
                    self.has_text_output = true;
                    match self
                        .blocks
                        .entry(index)
                        .or_insert_with(|| PartialBlock::Text(String::new()))
                    {
                        PartialBlock::Text(existing) => existing.push_str(&text),
                        PartialBlock::Tool { .. } => {
                            tracing::warn!(
                                target: "mercury_agent::chat::streaming",
                                index,
                                "text delta addressed to a tool block"
                            );
                        }
                    }
                    StreamEventResult::TextDelta(text)
                }
                ContentBlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(PartialBlock::Tool { json, .. }) = self.blocks.get_mut(&index) {
                        json.push_str(&partial_json);
                    }
                    StreamEventResult::ToolInputDelta
                }
            },
            StreamEvent::ContentBlockStop { index } => {
                if let Some(PartialBlock::Tool { name, .. }) = self.blocks.get(&index) {
                    return StreamEventResult::ToolReady(name.clone());
                }
                StreamEventResult::BlockStopped
            }
            StreamEvent::MessageDelta {
                stop_reason,
                usage,
                timings,
            } => {
                // A trailing usage-only delta must not erase the real reason.
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                if let Some(usage) = usage {
                    self.usage.merge(&usage);
                }
                if timings.is_some() {
                    self.timings = timings;
                }
                StreamEventResult::MessageDelta(stop_reason)
            }
            StreamEvent::MessageStop => StreamEventResult::MessageStop,
            StreamEvent::Ping => StreamEventResult::Ignored,
            StreamEvent::Error {
                error_type,
                message,
            } => StreamEventResult::Error {
                error_type,
                message,
            },
        }
    }

    /// Consume the accumulator and return the assembled reply
    pub fn finish(self) -> AssembledReply {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in self.blocks.into_values() {
            match block {
                PartialBlock::Text(t) => text.push_str(&t),
                PartialBlock::Tool {
                    id,
                    name,
                    input,
                    json,
                } => {
                    let arguments = if json.trim().is_empty() {
                        input
                    } else {
                        parse_tool_input(&json)
                    };
                    tool_calls.push(ToolCall::new(id, name, arguments));
                }
            }
        }

        AssembledReply {
            text,
            tool_calls,
            stop_reason: self.stop_reason,
            usage: self.usage,
            timings: self.timings,
        }
    }
}

/// Parse accumulated tool input. Unparseable JSON is kept verbatim as a
/// string so the dispatcher can reject it as malformed.
fn parse_tool_input(json: &str) -> Value {
    match serde_json::from_str(json) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                target: "mercury_agent::chat::streaming",
                error = %e,
                "tool input is not valid JSON"
            );
            Value::String(json.to_string())
        }
    }
}

/// Result of processing a stream event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEventResult {
    MessageStart,
    BlockStarted,
    /// Text to display
    TextDelta(String),
    ToolInputDelta,
    /// A tool call block finished; carries the tool name
    ToolReady(String),
    BlockStopped,
    MessageDelta(Option<StopReason>),
    MessageStop,
    Error {
        error_type: String,
        message: String,
    },
    /// Keep-alives and empty deltas
    Ignored,
}

impl StreamEventResult {
    pub fn text(&self) -> Option<&str> {
        match self {
            StreamEventResult::TextDelta(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamEventResult::Error { .. })
    }
}
