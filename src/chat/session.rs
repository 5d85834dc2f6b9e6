// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session management
//!
//! A [`Session`] owns the transcript and the turn machine:
//!
//! ```text
//! AwaitingUserInput -> AwaitingModelReply
//!     -> (AwaitingToolResult{id} -> AwaitingModelReply)*
//!     -> AwaitingUserInput
//! ```
//!
//! Every write goes through [`Session::append`], which rejects messages that
//! do not fit the current state.

use uuid::Uuid;

use crate::config::ProviderKind;
use crate::error::{AgentError, Result};
use crate::llm::message::{Message, Role};

/// Where the session is within a user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnState {
    AwaitingUserInput,
    AwaitingModelReply,
    AwaitingToolResult { tool_use_id: String },
}

impl TurnState {
    pub fn label(&self) -> &'static str {
        match self {
            TurnState::AwaitingUserInput => "awaiting user input",
            TurnState::AwaitingModelReply => "awaiting model reply",
            TurnState::AwaitingToolResult { .. } => "awaiting tool result",
        }
    }
}

/// One conversation with the agent
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    messages: Vec<Message>,
    provider: ProviderKind,
    model: String,
    tools_enabled: bool,
    turn: TurnState,
}

impl Session {
    pub fn new(provider: ProviderKind, model: impl Into<String>, tools_enabled: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
            provider,
            model: model.into(),
            tools_enabled,
            turn: TurnState::AwaitingUserInput,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// All messages, oldest first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools_enabled(&self) -> bool {
        self.tools_enabled
    }

    pub fn turn_state(&self) -> &TurnState {
        &self.turn
    }

    pub fn is_idle(&self) -> bool {
        self.turn == TurnState::AwaitingUserInput
    }

    /// Append a message, advancing the turn machine.
    ///
    /// - a user message starts a turn and is only accepted between turns;
    /// - an assistant message answers the pending model request; carrying a
    ///   tool call moves the turn to awaiting that call's result;
    /// - a tool message must answer the outstanding call.
    ///
    /// Assistant error notices are accepted at any point and end the turn.
    pub fn append(&mut self, message: Message) -> Result<()> {
        let next = match (&self.turn, message.role) {
            (_, Role::Assistant) if message.is_error => TurnState::AwaitingUserInput,
            (TurnState::AwaitingUserInput, Role::User) => TurnState::AwaitingModelReply,
            (TurnState::AwaitingModelReply, Role::Assistant) => match &message.tool_call {
                Some(call) => TurnState::AwaitingToolResult {
                    tool_use_id: call.id.clone(),
                },
                None => TurnState::AwaitingUserInput,
            },
            (TurnState::AwaitingToolResult { tool_use_id }, Role::Tool) => {
                match message.tool_use_id.as_deref() {
                    Some(id) if id == tool_use_id => TurnState::AwaitingModelReply,
                    other => {
                        return Err(AgentError::Session(format!(
                            "tool result for '{}' does not match the outstanding call '{}'",
                            other.unwrap_or("<none>"),
                            tool_use_id
                        )))
                    }
                }
            }
            (state, role) => {
                return Err(AgentError::Session(format!(
                    "cannot append a {} message while {}",
                    role.as_str(),
                    state.label()
                )))
            }
        };

        tracing::trace!(
            target: "mercury_agent::chat::session",
            role = message.role.as_str(),
            from = self.turn.label(),
            to = next.label(),
            "turn transition"
        );
        self.messages.push(message);
        self.turn = next;
        Ok(())
    }

    /// Close a turn that ended without a final assistant message, e.g. after
    /// the tool round limit.
    pub fn finish_turn(&mut self) {
        if self.turn != TurnState::AwaitingUserInput {
            tracing::debug!(
                target: "mercury_agent::chat::session",
                from = self.turn.label(),
                "closing turn early"
            );
        }
        self.turn = TurnState::AwaitingUserInput;
    }

    /// Record a provider failure as an assistant error notice and end the turn.
    pub fn fail_turn(&mut self, notice: impl Into<String>) {
        self.messages.push(Message::assistant_error(notice));
        self.turn = TurnState::AwaitingUserInput;
    }

    /// Drop every message and reset the turn machine.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.turn = TurnState::AwaitingUserInput;
    }

    /// Target subsequent turns at another provider/model. History is kept.
    pub fn switch_model(&mut self, provider: ProviderKind, model: impl Into<String>, tools_enabled: bool) {
        self.provider = provider;
        self.model = model.into();
        self.tools_enabled = tools_enabled;
    }

    /// Estimated token size of the transcript
    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(Message::estimated_tokens).sum()
    }

    /// Drop the oldest messages until the estimate fits `max_tokens`, then
    /// drop leading messages until the history starts at a user message.
    ///
    /// Only runs between turns. Returns how many messages were removed.
    pub fn trim_history(&mut self, max_tokens: usize) -> usize {
        if !self.is_idle() {
            return 0;
        }

        let mut total = self.estimated_tokens();
        let mut cut = 0;
        while total > max_tokens && cut < self.messages.len() {
            total -= self.messages[cut].estimated_tokens();
            cut += 1;
        }
        while cut < self.messages.len() && self.messages[cut].role != Role::User {
            cut += 1;
        }
        if cut == 0 {
            return 0;
        }

        self.messages.drain(..cut);
        tracing::debug!(
            target: "mercury_agent::chat::session",
            removed = cut,
            remaining = self.messages.len(),
            "trimmed history"
        );
        cut
    }
}
