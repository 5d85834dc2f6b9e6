// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Shared conversation engine
//!
//! Runs one user turn: pull the current piece, stream the model reply,
//! execute at most one tool call per assistant message, and loop until the
//! model answers without a tool call or the round limit is hit. Both shells
//! drive turns through [`ChatEngine::run_turn`] and render progress through a
//! [`TurnObserver`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::Serialize;

use crate::chat::extractor::extract_code;
use crate::chat::metrics::ResponseMetrics;
use crate::chat::session::Session;
use crate::chat::streaming::{AssembledReply, StreamAccumulator, StreamEventResult};
use crate::config::{ProviderKind, Settings};
use crate::error::{AgentError, ApiError, Result};
use crate::llm::factory::ProviderRegistry;
use crate::llm::message::{Message, ToolCall};
use crate::llm::provider::{CompletionRequest, LlmProvider, SystemBlock};
use crate::llm::retry::{with_retry_notify, RetryConfig};
use crate::mercury::{PieceView, PlaygroundSync};
use crate::tools::{tool_definitions, MercuryTool, ToolDispatcher, ToolResult};

/// Model/tool rounds allowed per user turn
pub const MAX_TOOL_ROUNDS: usize = 5;

/// Output hooks for a running turn.
///
/// Shells implement this to render streaming text, tool activity and
/// warnings as they happen.
pub trait TurnObserver: Send {
    /// A model request is about to be sent
    fn on_thinking(&mut self) {}

    fn on_text_delta(&mut self, _text: &str) {}

    /// A transient provider failure will be retried after `delay`
    fn on_retry(&mut self, _error: &AgentError, _attempt: u32, _delay: Duration) {}

    /// Text already streamed by a failed attempt is void; the retry streams
    /// the reply again from the start
    fn on_reply_discarded(&mut self) {}

    fn on_tool_call(&mut self, _call: &ToolCall) {}

    fn on_tool_result(&mut self, _name: &str, _result: &ToolResult) {}

    /// Code reached the Playground, through `send_code` or the extractor
    fn on_code_sent(&mut self, _code: &str) {}

    fn on_warning(&mut self, _warning: &str) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NoopTurnObserver;

impl TurnObserver for NoopTurnObserver {}

/// One executed tool call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutcome {
    pub name: String,
    pub result: String,
    pub is_error: bool,
}

/// Everything a shell needs to render a finished turn
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Assistant text across all rounds
    pub reply: String,
    /// Code that reached the Playground during the turn
    pub code: Option<String>,
    pub tool_results: Vec<ToolOutcome>,
    pub metrics: ResponseMetrics,
    pub warnings: Vec<String>,
    /// The piece given to the model was a last-known copy
    pub stale_piece: bool,
}

/// Lets the retry callback and the streaming attempt share one observer.
struct SharedObserver<'a> {
    inner: Mutex<&'a mut (dyn TurnObserver + 'a)>,
}

impl<'a> SharedObserver<'a> {
    fn new(observer: &'a mut (dyn TurnObserver + 'a)) -> Self {
        Self {
            inner: Mutex::new(observer),
        }
    }

    fn call<R>(&self, f: impl FnOnce(&mut (dyn TurnObserver + 'a)) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut **guard)
    }
}

/// Conversation engine shared by every session of a process
pub struct ChatEngine {
    registry: ProviderRegistry,
    sync: PlaygroundSync,
    system_prompt: String,
    retry: RetryConfig,
}

impl ChatEngine {
    pub fn new(registry: ProviderRegistry, sync: PlaygroundSync, system_prompt: impl Into<String>) -> Self {
        let retry = RetryConfig::from(&registry.settings().resilience);
        Self {
            registry,
            sync,
            system_prompt: system_prompt.into(),
            retry,
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        self.registry.settings()
    }

    pub fn sync(&self) -> &PlaygroundSync {
        &self.sync
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn provider(&self, kind: ProviderKind) -> Result<Arc<dyn LlmProvider>> {
        self.registry.get(kind)
    }

    /// Start a session on the configured provider and model, probing tool
    /// support.
    pub async fn open_session(&self) -> Result<Session> {
        let settings = self.settings();
        let kind = settings.provider;
        let model = settings.model();
        let provider = self.provider(kind)?;
        let tools = provider.supports_tools(&model).await;

        tracing::info!(
            target: "mercury_agent::chat::engine",
            provider = %kind,
            model = %model,
            tools,
            "opened session"
        );
        Ok(Session::new(kind, model, tools))
    }

    /// Run one user turn to completion.
    ///
    /// Provider failures that survive retries are recorded in the transcript
    /// as an assistant error notice, the session returns to awaiting input,
    /// and the error is returned. Tool failures never end the turn.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        user_text: &str,
        observer: &mut dyn TurnObserver,
    ) -> Result<TurnOutcome> {
        if !session.is_idle() {
            return Err(AgentError::Session(format!(
                "a turn is already in progress ({})",
                session.turn_state().label()
            )));
        }
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(AgentError::InvalidInput("missing message".to_string()));
        }

        let provider = self.provider(session.provider())?;
        let observer = SharedObserver::new(observer);
        let mut outcome = TurnOutcome::default();

        let budget = self.settings().history_budget();
        session.trim_history(budget);

        let view = self.sync.refresh().await;
        if let Some(warning) = &view.warning {
            observer.call(|o| o.on_warning(warning));
            outcome.warnings.push(warning.clone());
        }
        outcome.stale_piece = view.stale;

        session.append(Message::user(user_text))?;
        let mut dispatcher = ToolDispatcher::new(self.sync.clone());
        let mut finished = false;

        tracing::info!(
            target: "mercury_agent::chat::engine",
            session = %session.id(),
            provider = provider.name(),
            model = session.model(),
            tools = session.tools_enabled(),
            history = session.len(),
            "starting turn"
        );

        for round in 0..MAX_TOOL_ROUNDS {
            let request = self.build_request(session, &view);
            observer.call(|o| o.on_thinking());

            let started = Instant::now();
            let reply = match self.request_reply(provider.as_ref(), &request, &observer).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(
                        target: "mercury_agent::chat::engine",
                        provider = provider.name(),
                        model = session.model(),
                        error = %e,
                        "model request failed"
                    );
                    session.fail_turn(format!("Error: {}", e));
                    return Err(e);
                }
            };
            outcome.metrics.absorb(&ResponseMetrics::from_response(
                &reply.usage,
                reply.timings.as_ref(),
                started.elapsed(),
            ));

            let AssembledReply {
                text, tool_calls, ..
            } = reply;
            outcome.reply.push_str(&text);

            let Some(call) = first_tool_call(tool_calls) else {
                if round > 0 && text.trim().is_empty() && dispatcher.last_code_sent().is_none() {
                    let warning = "Model returned an empty reply after a tool call (retrying may help).";
                    observer.call(|o| o.on_warning(warning));
                    outcome.warnings.push(warning.to_string());
                }
                if text.trim().is_empty() {
                    session.finish_turn();
                } else {
                    session.append(Message::assistant(text))?;
                }
                finished = true;
                break;
            };

            session.append(Message::assistant_tool_call(text, call.clone()))?;
            observer.call(|o| o.on_tool_call(&call));
            let result = dispatcher.dispatch(&call).await;
            observer.call(|o| o.on_tool_result(&call.name, &result));
            session.append(Message::tool_result(
                &result.tool_use_id,
                result.output_text(),
                result.is_error(),
            ))?;

            if MercuryTool::from_name(&call.name) == Some(MercuryTool::SendCode) && !result.is_error() {
                if let Some(code) = dispatcher.last_code_sent() {
                    observer.call(|o| o.on_code_sent(code));
                }
            }
            outcome.tool_results.push(ToolOutcome {
                name: call.name.clone(),
                result: result.output_text().to_string(),
                is_error: result.is_error(),
            });
        }

        if !finished {
            let warning = format!("Stopped after {} tool rounds.", MAX_TOOL_ROUNDS);
            tracing::warn!(target: "mercury_agent::chat::engine", "{}", warning);
            observer.call(|o| o.on_warning(&warning));
            outcome.warnings.push(warning);
            session.finish_turn();
        }

        outcome.code = dispatcher.last_code_sent().map(str::to_string);
        if outcome.code.is_none() && !outcome.reply.is_empty() {
            if let Some(code) = extract_code(&outcome.reply) {
                match self.send_extracted(&code).await {
                    Ok(()) => {
                        observer.call(|o| o.on_code_sent(&code));
                        outcome.code = Some(code);
                    }
                    Err(e) => {
                        let warning = format!("Failed to send code to Mercury: {}", e);
                        observer.call(|o| o.on_warning(&warning));
                        outcome.warnings.push(warning);
                    }
                }
            }
        }

        tracing::info!(
            target: "mercury_agent::chat::engine",
            session = %session.id(),
            tool_calls = outcome.tool_results.len(),
            code_sent = outcome.code.is_some(),
            metrics = %outcome.metrics.format_compact(),
            "turn complete"
        );
        Ok(outcome)
    }

    fn build_request(&self, session: &Session, view: &PieceView) -> CompletionRequest {
        let messages = session
            .messages()
            .iter()
            .filter(|m| m.sent_to_model())
            .cloned()
            .collect();

        let mut request = CompletionRequest::new(session.model(), messages)
            .with_system(SystemBlock::cached(self.system_prompt.clone()));
        if let Some(piece) = &view.piece {
            request = request.with_system(SystemBlock::volatile(piece.as_context()));
        }
        if session.tools_enabled() {
            request = request.with_tools(tool_definitions());
        }
        request
    }

    async fn request_reply(
        &self,
        provider: &dyn LlmProvider,
        request: &CompletionRequest,
        observer: &SharedObserver<'_>,
    ) -> Result<AssembledReply> {
        let streamed = AtomicBool::new(false);
        with_retry_notify(
            || stream_reply(provider, request.clone(), observer, &streamed),
            Some(self.retry.clone()),
            "model completion",
            |error, attempt, delay| {
                observer.call(|o| {
                    if streamed.swap(false, Ordering::Relaxed) {
                        o.on_reply_discarded();
                    }
                    o.on_retry(error, attempt, delay)
                })
            },
        )
        .await
    }

    async fn send_extracted(&self, code: &str) -> Result<()> {
        self.sync.client().send_code(code).await?;
        if let Err(e) = self.sync.state().write(code) {
            tracing::warn!(
                target: "mercury_agent::chat::engine",
                error = %e,
                "extracted code sent but state file could not be written"
            );
        }
        self.sync.record_sent(code);
        Ok(())
    }
}

/// Keep only the first tool call of an assistant message.
fn first_tool_call(mut calls: Vec<ToolCall>) -> Option<ToolCall> {
    if calls.len() > 1 {
        tracing::warn!(
            target: "mercury_agent::chat::engine",
            kept = %calls[0].name,
            dropped = calls.len() - 1,
            "model returned several tool calls; only the first is executed"
        );
        calls.truncate(1);
    }
    calls.pop()
}

/// Stream one completion attempt, forwarding text deltas to the observer.
/// `streamed` is set once any text has been forwarded.
async fn stream_reply(
    provider: &dyn LlmProvider,
    request: CompletionRequest,
    observer: &SharedObserver<'_>,
    streamed: &AtomicBool,
) -> Result<AssembledReply> {
    let mut stream = provider.complete_stream(request).await?;
    let mut accumulator = StreamAccumulator::new();

    while let Some(event) = stream.next().await {
        match accumulator.process_event(event?) {
            StreamEventResult::TextDelta(text) => {
                streamed.store(true, Ordering::Relaxed);
                observer.call(|o| o.on_text_delta(&text))
            }
            StreamEventResult::Error {
                error_type,
                message,
            } => return Err(stream_error(&error_type, &message)),
            StreamEventResult::MessageStop => break,
            _ => {}
        }
    }

    Ok(accumulator.finish())
}

/// In-stream errors: overload and rate limits are transient, anything else
/// is treated as a bad response.
fn stream_error(error_type: &str, message: &str) -> AgentError {
    let detail = format!("{}: {}", error_type, message);
    if error_type.contains("overloaded") || error_type.contains("rate_limit") || error_type == "api_error" {
        AgentError::Api(ApiError::StreamError(detail))
    } else {
        AgentError::Api(ApiError::InvalidResponse(detail))
    }
}
