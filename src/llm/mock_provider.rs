// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock LLM provider for testing
//!
//! Provides a scripted implementation of the LlmProvider trait that can be
//! used in unit and integration tests without making real API calls.

use async_trait::async_trait;
use futures::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{AgentError, ApiError, Result};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentBlockDelta, ContentBlockResponse, EventStream,
    LlmProvider, StopReason, StreamEvent, Timings, Usage,
};

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Scripted responses, consumed in order; the last one repeats
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
    /// Models reported by `list_models`
    models: Vec<String>,
    /// Whether tool definitions are accepted
    tools_supported: bool,
}

/// A pre-configured response for the mock provider
#[derive(Clone, Debug)]
pub struct MockResponse {
    /// Text content to return
    pub text: String,
    /// Tool calls to return
    pub tool_calls: Vec<MockToolCall>,
    /// Stop reason
    pub stop_reason: StopReason,
    /// Token usage
    pub usage: Usage,
    /// Fail the call instead of answering
    pub failure: Option<MockFailure>,
}

/// A mock tool call
#[derive(Clone, Debug)]
pub struct MockToolCall {
    /// Tool call ID
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool input (JSON)
    pub input: serde_json::Value,
}

/// Failure modes the mock can simulate
#[derive(Clone, Debug, PartialEq)]
pub enum MockFailure {
    /// Transient connection failure (retryable)
    Network,
    /// Invalid credentials (never retried)
    Authentication,
    /// Server error with the given status
    Server(u16),
    /// Stream the response text, then fail with a transient overload
    MidStream,
}

impl MockFailure {
    fn to_error(&self) -> AgentError {
        match self {
            MockFailure::Network => {
                AgentError::Api(ApiError::Network("connection refused".to_string()))
            }
            MockFailure::Authentication => AgentError::Api(ApiError::AuthenticationFailed(
                "mock API key is invalid".to_string(),
            )),
            MockFailure::Server(status) => AgentError::Api(ApiError::ServerError {
                status: *status,
                message: "mock server error".to_string(),
            }),
            MockFailure::MidStream => AgentError::Api(ApiError::StreamError(
                "overloaded_error: mock overloaded".to_string(),
            )),
        }
    }
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: "Mock response".to_string(),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
                ..Usage::default()
            },
            failure: None,
        }
    }
}

impl MockResponse {
    /// A plain text answer
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// A tool call, optionally preceded by text
    pub fn tool_call(
        text: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self {
            text: text.into(),
            tool_calls: vec![MockToolCall {
                id: format!("toolu_{}", uuid::Uuid::new_v4().simple()),
                name: name.into(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            ..Default::default()
        }
    }

    /// A failing call
    pub fn failure(failure: MockFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Default::default()
        }
    }

    /// A stream that delivers `partial` and then breaks off
    pub fn cut_off(partial: impl Into<String>) -> Self {
        Self {
            text: partial.into(),
            failure: Some(MockFailure::MidStream),
            ..Default::default()
        }
    }

    /// Add another tool call to the same message
    pub fn and_tool_call(mut self, name: impl Into<String>, input: serde_json::Value) -> Self {
        self.tool_calls.push(MockToolCall {
            id: format!("toolu_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            input,
        });
        self.stop_reason = StopReason::ToolUse;
        self
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            responses: Arc::new(Mutex::new(vec![MockResponse::default()])),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
            models: vec!["mock-model".to_string()],
            tools_supported: true,
        }
    }

    /// Create a mock provider with a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut provider = Self::new();
        provider.name = name.into();
        provider
    }

    /// Set a single text response
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_script(vec![MockResponse::text(text)])
    }

    /// Queue responses (returned in order, the last one repeats)
    pub fn with_script(self, script: Vec<MockResponse>) -> Self {
        {
            let mut responses = lock(&self.responses);
            *responses = script;
        }
        self
    }

    /// Set the models reported by `list_models`
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    /// Report the model as unable to use tools
    pub fn without_tools(mut self) -> Self {
        self.tools_supported = false;
        self
    }

    /// Get the number of completion calls made
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    /// Reset call count and recorded requests
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        lock(&self.recorded_requests).clear();
    }

    fn record(&self, request: &CompletionRequest) -> MockResponse {
        lock(&self.recorded_requests).push(request.clone());
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        let responses = lock(&self.responses);
        if responses.is_empty() {
            MockResponse::default()
        } else {
            responses[count.min(responses.len() - 1)].clone()
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.models.clone())
    }

    async fn supports_tools(&self, _model: &str) -> bool {
        self.tools_supported
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let response = self.record(&request);
        if let Some(failure) = &response.failure {
            return Err(failure.to_error());
        }

        let mut content = vec![];
        if !response.text.is_empty() {
            content.push(ContentBlockResponse::Text {
                text: response.text,
            });
        }
        for tool_call in response.tool_calls {
            content.push(ContentBlockResponse::ToolUse {
                id: tool_call.id,
                name: tool_call.name,
                input: tool_call.input,
            });
        }

        Ok(CompletionResponse {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            model: request.model,
            content,
            stop_reason: Some(response.stop_reason),
            usage: response.usage,
            timings: None,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let response = self.record(&request);
        let cut_off = match &response.failure {
            Some(MockFailure::MidStream) => true,
            Some(failure) => return Err(failure.to_error()),
            None => false,
        };

        let mut events = vec![Ok(StreamEvent::MessageStart {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            model: request.model.clone(),
            usage: None,
        })];

        let has_text = !response.text.is_empty();
        if has_text {
            events.push(Ok(StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ContentBlockResponse::Text {
                    text: String::new(),
                },
            }));

            // Stream the text in chunks
            for chunk in response.text.chars().collect::<Vec<_>>().chunks(10) {
                let text: String = chunk.iter().collect();
                events.push(Ok(StreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: ContentBlockDelta::TextDelta { text },
                }));
            }

            events.push(Ok(StreamEvent::ContentBlockStop { index: 0 }));
        }

        if cut_off {
            events.push(Ok(StreamEvent::Error {
                error_type: "overloaded_error".to_string(),
                message: "mock overloaded".to_string(),
            }));
            return Ok(Box::pin(stream::iter(events)));
        }

        for (i, tool_call) in response.tool_calls.into_iter().enumerate() {
            let index = if has_text { i + 1 } else { i };
            events.push(Ok(StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlockResponse::ToolUse {
                    id: tool_call.id,
                    name: tool_call.name,
                    input: serde_json::json!({}),
                },
            }));
            events.push(Ok(StreamEvent::ContentBlockDelta {
                index,
                delta: ContentBlockDelta::InputJsonDelta {
                    partial_json: tool_call.input.to_string(),
                },
            }));
            events.push(Ok(StreamEvent::ContentBlockStop { index }));
        }

        events.push(Ok(StreamEvent::MessageDelta {
            stop_reason: Some(response.stop_reason),
            usage: Some(response.usage),
            timings: Some(Timings {
                total_ms: 5.0,
                eval_ms: 4.0,
                ..Timings::default()
            }),
        }));
        events.push(Ok(StreamEvent::MessageStop));

        Ok(Box::pin(stream::iter(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::Message;
    use futures::{StreamExt, TryStreamExt};
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest::new("mock-model", vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn test_default_response() {
        let provider = MockProvider::new();
        let response = provider.complete(request()).await.unwrap();
        assert_eq!(
            response.content,
            vec![ContentBlockResponse::Text {
                text: "Mock response".to_string()
            }]
        );
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_script_in_order_then_repeats_last() {
        let provider = MockProvider::new().with_script(vec![
            MockResponse::tool_call("", "silence", json!({})),
            MockResponse::text("Done."),
        ]);

        let first = provider.complete(request()).await.unwrap();
        assert_eq!(first.stop_reason, Some(StopReason::ToolUse));
        let second = provider.complete(request()).await.unwrap();
        let third = provider.complete(request()).await.unwrap();
        assert_eq!(second.content, third.content);
        assert_eq!(provider.recorded_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_stream_tool_call_arguments_as_json_delta() {
        let provider = MockProvider::new().with_script(vec![MockResponse::tool_call(
            "Sending.",
            "send_code",
            json!({"code": "set tempo 90"}),
        )]);

        let events: Vec<StreamEvent> = provider
            .complete_stream(request())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let json = events.iter().find_map(|e| match e {
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: ContentBlockDelta::InputJsonDelta { partial_json },
            } => Some(partial_json.clone()),
            _ => None,
        });
        assert_eq!(json.as_deref(), Some(r#"{"code":"set tempo 90"}"#));
    }

    #[tokio::test]
    async fn test_failure() {
        let provider =
            MockProvider::new().with_script(vec![MockResponse::failure(MockFailure::Authentication)]);
        let err = match provider.complete_stream(request()).await {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert!(err.is_configuration());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cut_off_streams_text_then_errors() {
        let provider = MockProvider::new().with_script(vec![MockResponse::cut_off("Here is a")]);
        let events: Vec<_> = provider
            .complete_stream(request())
            .await
            .unwrap()
            .collect()
            .await;
        assert!(events.iter().any(|e| matches!(
            e,
            Ok(StreamEvent::ContentBlockDelta {
                delta: ContentBlockDelta::TextDelta { .. },
                ..
            })
        )));
        assert!(matches!(
            events.last(),
            Some(Ok(StreamEvent::Error { error_type, .. })) if error_type == "overloaded_error"
        ));
    }

    #[tokio::test]
    async fn test_reset() {
        let provider = MockProvider::new();
        provider.complete(request()).await.unwrap();
        provider.reset();
        assert_eq!(provider.call_count(), 0);
        assert!(provider.last_request().is_none());
    }
}
