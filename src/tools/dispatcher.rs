// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool dispatcher
//!
//! Executes one model tool call against the Playground. Failures never
//! propagate as errors; they come back as error [`ToolResult`]s so the model
//! can react to them.

use serde_json::{Map, Value};

use crate::llm::message::ToolCall;
use crate::mercury::PlaygroundSync;

use super::{MercuryTool, ToolResult};

pub const NO_PIECE_PLAYING: &str = "(No piece currently playing.)";

/// Executes tool calls for one session.
///
/// `dispatch` takes `&mut self`, so a session can never have two tool calls
/// running at once.
#[derive(Debug)]
pub struct ToolDispatcher {
    sync: PlaygroundSync,
    last_code_sent: Option<String>,
}

impl ToolDispatcher {
    pub fn new(sync: PlaygroundSync) -> Self {
        Self {
            sync,
            last_code_sent: None,
        }
    }

    /// Code successfully sent through `send_code` by this dispatcher
    pub fn last_code_sent(&self) -> Option<&str> {
        self.last_code_sent.as_deref()
    }

    /// Execute a tool call and produce its result.
    pub async fn dispatch(&mut self, call: &ToolCall) -> ToolResult {
        let Some(tool) = MercuryTool::from_name(&call.name) else {
            tracing::warn!(
                target: "mercury_agent::tools::dispatcher",
                tool = %call.name,
                "model requested an unknown tool"
            );
            return ToolResult::error(&call.id, format!("Unknown tool: {}", call.name));
        };

        let args = match &call.arguments {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                tracing::warn!(
                    target: "mercury_agent::tools::dispatcher",
                    tool = tool.name(),
                    arguments = %other,
                    "rejecting malformed tool arguments"
                );
                return ToolResult::error(
                    &call.id,
                    format!(
                        "Invalid arguments for {}: expected a JSON object",
                        tool.name()
                    ),
                );
            }
        };

        tracing::info!(
            target: "mercury_agent::tools::dispatcher",
            tool = tool.name(),
            tool_use_id = %call.id,
            "executing tool"
        );

        match tool {
            MercuryTool::SendCode => self.send_code(&call.id, &args).await,
            MercuryTool::Silence => self.silence(&call.id).await,
            MercuryTool::GetCurrentPiece => self.get_current_piece(&call.id).await,
        }
    }

    async fn send_code(&mut self, id: &str, args: &Map<String, Value>) -> ToolResult {
        let code = match args.get("code") {
            None | Some(Value::Null) => "",
            Some(Value::String(code)) => code.as_str(),
            Some(_) => {
                return ToolResult::error(
                    id,
                    "Invalid arguments for send_code: 'code' must be a string",
                )
            }
        };
        if code.trim().is_empty() {
            return ToolResult::error(id, "Error: no code provided.");
        }

        if let Err(e) = self.sync.client().send_code(code).await {
            return ToolResult::error(id, format!("Error: failed to send code to Mercury: {}", e));
        }

        if let Err(e) = self.sync.state().write(code) {
            tracing::warn!(
                target: "mercury_agent::tools::dispatcher",
                error = %e,
                "code sent but state file could not be written"
            );
        }
        self.sync.record_sent(code);
        self.last_code_sent = Some(code.to_string());

        ToolResult::success(
            id,
            format!("Code sent to Mercury ({} lines).", code.lines().count()),
        )
    }

    async fn silence(&mut self, id: &str) -> ToolResult {
        if let Err(e) = self.sync.client().silence().await {
            return ToolResult::error(id, format!("Error: failed to silence Mercury: {}", e));
        }
        if let Err(e) = self.sync.state().clear() {
            tracing::warn!(
                target: "mercury_agent::tools::dispatcher",
                error = %e,
                "silenced but state file could not be cleared"
            );
        }
        self.sync.record_silenced();
        self.last_code_sent = None;
        ToolResult::success(id, "Silenced.")
    }

    async fn get_current_piece(&mut self, id: &str) -> ToolResult {
        let view = self.sync.refresh().await;
        match view.piece {
            Some(piece) if view.stale => ToolResult::success(
                id,
                format!(
                    "{}\n\n(Note: Mercury Playground is unreachable; this is the last-known piece from {}.)",
                    piece.code,
                    piece.fetched_at.format("%H:%M:%S UTC")
                ),
            ),
            Some(piece) => ToolResult::success(id, piece.code),
            None => ToolResult::success(id, NO_PIECE_PLAYING),
        }
    }
}
