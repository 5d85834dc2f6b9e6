// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system
//!
//! The model can call exactly three tools, all of which act on the Mercury
//! Playground: `send_code`, `silence` and `get_current_piece`.

pub mod dispatcher;

pub use dispatcher::*;

use serde_json::json;

use crate::llm::provider::{ToolDefinition, ToolInputSchema};

/// The fixed tool set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MercuryTool {
    SendCode,
    Silence,
    GetCurrentPiece,
}

impl MercuryTool {
    pub const ALL: [MercuryTool; 3] = [
        MercuryTool::SendCode,
        MercuryTool::Silence,
        MercuryTool::GetCurrentPiece,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MercuryTool::SendCode => "send_code",
            MercuryTool::Silence => "silence",
            MercuryTool::GetCurrentPiece => "get_current_piece",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Definition advertised to the model
    pub fn definition(&self) -> ToolDefinition {
        let (description, input_schema) = match self {
            MercuryTool::SendCode => (
                "Evaluate Mercury live-coding language in the browser. Sends the full Mercury \
                 code to the running Mercury Playground webapp.",
                ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties: json!({
                        "code": {
                            "type": "string",
                            "description": "Complete Mercury code to evaluate"
                        }
                    }),
                    required: vec!["code".to_string()],
                },
            ),
            MercuryTool::Silence => ("Stop all sound in Mercury Playground.", empty_schema()),
            MercuryTool::GetCurrentPiece => (
                "Retrieve the Mercury code that is currently playing (includes changes made \
                 in the browser editor).",
                empty_schema(),
            ),
        };

        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

fn empty_schema() -> ToolInputSchema {
    ToolInputSchema {
        schema_type: "object".to_string(),
        properties: json!({}),
        required: vec![],
    }
}

/// Definitions for every tool, in a stable order
pub fn tool_definitions() -> Vec<ToolDefinition> {
    MercuryTool::ALL.iter().map(|t| t.definition()).collect()
}

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// The tool_use_id this result corresponds to
    pub tool_use_id: String,
    /// The output of the tool
    pub output: ToolOutput,
}

/// Output from a tool
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Successful output
    Success(String),
    /// Error output
    Error(String),
}

impl ToolResult {
    /// Create a successful result
    pub fn success(tool_use_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            output: ToolOutput::Success(output.into()),
        }
    }

    /// Create an error result
    pub fn error(tool_use_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            output: ToolOutput::Error(error.into()),
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self.output, ToolOutput::Error(_))
    }

    /// Get the output text
    pub fn output_text(&self) -> &str {
        match &self.output {
            ToolOutput::Success(s) => s,
            ToolOutput::Error(s) => s,
        }
    }
}
