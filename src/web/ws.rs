// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! WebSocket chat endpoint
//!
//! Each connection owns a [`Session`]. Client frames are
//! `{"message": "..."}`; replies stream back as typed JSON events.

use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::chat::commands::{self, CommandResult, SlashCommand};
use crate::chat::{ChatEngine, Session, TurnObserver};
use crate::error::AgentError;
use crate::mercury::CurrentPiece;
use crate::tools::ToolResult;

use super::server::AppState;

/// Typed events sent to the browser
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Token {
        content: String,
    },
    Tool {
        name: String,
        result: String,
    },
    Done {
        code: Option<String>,
        tool_results: Vec<String>,
        metrics: Value,
    },
    Command {
        output: String,
    },
    Warning {
        message: String,
    },
    /// Drop the tokens streamed so far; the reply restarts
    Reset,
    /// The Playground piece changed outside this conversation
    Piece {
        code: String,
        lines: usize,
    },
}

/// Everything that goes over the socket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutgoingFrame {
    Event(ServerEvent),
    Error { error: String },
}

impl OutgoingFrame {
    fn error(message: impl Into<String>) -> Self {
        OutgoingFrame::Error {
            error: message.into(),
        }
    }
}

impl From<ServerEvent> for OutgoingFrame {
    fn from(event: ServerEvent) -> Self {
        OutgoingFrame::Event(event)
    }
}

#[derive(Debug, Deserialize)]
struct ClientMessage {
    #[serde(default)]
    message: String,
}

/// Whether the connection should stay open after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

struct WsObserver {
    tx: mpsc::UnboundedSender<OutgoingFrame>,
}

impl WsObserver {
    fn send(&self, event: ServerEvent) {
        let _ = self.tx.send(event.into());
    }
}

impl TurnObserver for WsObserver {
    fn on_text_delta(&mut self, text: &str) {
        self.send(ServerEvent::Token {
            content: text.to_string(),
        });
    }

    fn on_tool_result(&mut self, name: &str, result: &ToolResult) {
        self.send(ServerEvent::Tool {
            name: name.to_string(),
            result: result.output_text().to_string(),
        });
    }

    fn on_warning(&mut self, warning: &str) {
        self.send(ServerEvent::Warning {
            message: warning.to_string(),
        });
    }

    fn on_retry(&mut self, error: &AgentError, attempt: u32, delay: Duration) {
        self.send(ServerEvent::Warning {
            message: format!(
                "{} (retry {} in {:.1}s)",
                error,
                attempt,
                delay.as_secs_f64()
            ),
        });
    }

    fn on_reply_discarded(&mut self) {
        self.send(ServerEvent::Reset);
    }
}

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutgoingFrame>();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(target: "mercury_agent::web::ws", error = %e, "failed to serialize frame");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let engine = state.engine;
    let mut session = match engine.open_session().await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(target: "mercury_agent::web::ws", error = %e, "could not open session");
            let _ = tx.send(OutgoingFrame::error(e.to_string()));
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };
    tracing::info!(
        target: "mercury_agent::web::ws",
        session_id = %session.id(),
        model = session.model(),
        "websocket connected"
    );
    let piece_task = tokio::spawn(forward_piece_changes(engine.sync().subscribe(), tx.clone()));

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            WsMessage::Text(text) => text.to_string(),
            WsMessage::Close(_) => break,
            _ => continue,
        };
        if process_client_message(&engine, &mut session, &text, &tx).await == Flow::Close {
            break;
        }
    }

    tracing::info!(
        target: "mercury_agent::web::ws",
        session_id = %session.id(),
        messages = session.len(),
        "websocket disconnected"
    );
    piece_task.abort();
    drop(tx);
    let _ = send_task.await;
}

/// Push a `piece` event whenever the cached Playground piece changes,
/// whether the agent sent it or the poller saw an edit in the browser.
pub async fn forward_piece_changes(
    mut pieces: watch::Receiver<Option<CurrentPiece>>,
    tx: mpsc::UnboundedSender<OutgoingFrame>,
) {
    while pieces.changed().await.is_ok() {
        let event = match pieces.borrow_and_update().as_ref() {
            Some(piece) => ServerEvent::Piece {
                code: piece.code.clone(),
                lines: piece.line_count(),
            },
            None => ServerEvent::Piece {
                code: String::new(),
                lines: 0,
            },
        };
        if tx.send(event.into()).is_err() {
            break;
        }
    }
}

/// Handle one client frame, pushing every reply onto `tx`.
pub async fn process_client_message(
    engine: &ChatEngine,
    session: &mut Session,
    raw: &str,
    tx: &mpsc::UnboundedSender<OutgoingFrame>,
) -> Flow {
    let message = match serde_json::from_str::<ClientMessage>(raw) {
        Ok(parsed) => parsed.message,
        Err(e) => {
            let _ = tx.send(OutgoingFrame::error(format!("invalid message: {}", e)));
            return Flow::Continue;
        }
    };
    let message = message.trim();
    if message.is_empty() {
        let _ = tx.send(OutgoingFrame::error("missing message"));
        return Flow::Continue;
    }

    if let Some(command) = SlashCommand::parse(message) {
        let result = commands::execute(engine, session, command).await;
        let _ = tx.send(
            ServerEvent::Command {
                output: result.text().to_string(),
            }
            .into(),
        );
        return match result {
            CommandResult::Quit => Flow::Close,
            _ => Flow::Continue,
        };
    }

    let mut observer = WsObserver { tx: tx.clone() };
    match engine.run_turn(session, message, &mut observer).await {
        Ok(outcome) => {
            let _ = tx.send(
                ServerEvent::Done {
                    code: outcome.code,
                    tool_results: outcome.tool_results.into_iter().map(|t| t.result).collect(),
                    metrics: outcome.metrics.to_json(),
                }
                .into(),
            );
        }
        Err(e) => {
            tracing::warn!(
                target: "mercury_agent::web::ws",
                session_id = %session.id(),
                error = %e,
                "turn failed"
            );
            let _ = tx.send(OutgoingFrame::error(e.to_string()));
        }
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderKind, Settings};
    use crate::llm::factory::ProviderRegistry;
    use crate::llm::mock_provider::{MockFailure, MockProvider, MockResponse};
    use crate::llm::retry::RetryConfig;
    use crate::mercury::{PieceState, PlaygroundClient, PlaygroundSync};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine_with(provider: MockProvider, temp_dir: &TempDir) -> ChatEngine {
        let registry = ProviderRegistry::new(Settings::default());
        registry.insert(ProviderKind::Ollama, Arc::new(provider));
        let client = PlaygroundClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let state = PieceState::new(temp_dir.path().join("current_piece.txt"));
        ChatEngine::new(registry, PlaygroundSync::new(client, state), "prompt")
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutgoingFrame>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(serde_json::to_value(frame).unwrap());
        }
        frames
    }

    #[test]
    fn test_frame_shapes() {
        let token = serde_json::to_value(OutgoingFrame::from(ServerEvent::Token {
            content: "hi".into(),
        }))
        .unwrap();
        assert_eq!(token, json!({ "type": "token", "content": "hi" }));

        let error = serde_json::to_value(OutgoingFrame::error("boom")).unwrap();
        assert_eq!(error, json!({ "error": "boom" }));
    }

    #[tokio::test]
    async fn test_turn_streams_tokens_then_done() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine_with(MockProvider::new().with_response("A slow groove."), &temp_dir);
        let mut session = Session::new(ProviderKind::Ollama, "mock-model", false);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let flow = process_client_message(&engine, &mut session, r#"{"message":"play"}"#, &tx).await;
        assert_eq!(flow, Flow::Continue);

        let frames = drain(&mut rx);
        let tokens: String = frames
            .iter()
            .filter(|f| f["type"] == "token")
            .map(|f| f["content"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(tokens, "A slow groove.");

        let done = frames.last().unwrap();
        assert_eq!(done["type"], "done");
        assert_eq!(done["code"], Value::Null);
        assert_eq!(done["tool_results"], json!([]));
        assert_eq!(session.len(), 2);
    }

    #[tokio::test]
    async fn test_slash_command_reply() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine_with(MockProvider::new(), &temp_dir);
        let mut session = Session::new(ProviderKind::Ollama, "mock-model", true);
        let (tx, mut rx) = mpsc::unbounded_channel();

        process_client_message(&engine, &mut session, r#"{"message":"/clear"}"#, &tx).await;
        let frames = drain(&mut rx);
        assert_eq!(frames, vec![json!({ "type": "command", "output": "History cleared." })]);

        let flow = process_client_message(&engine, &mut session, r#"{"message":"/quit"}"#, &tx).await;
        assert_eq!(flow, Flow::Close);
    }

    #[tokio::test]
    async fn test_bad_frames_report_errors() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine_with(MockProvider::new(), &temp_dir);
        let mut session = Session::new(ProviderKind::Ollama, "mock-model", true);
        let (tx, mut rx) = mpsc::unbounded_channel();

        process_client_message(&engine, &mut session, r#"{"message":"  "}"#, &tx).await;
        process_client_message(&engine, &mut session, "not json", &tx).await;

        let frames = drain(&mut rx);
        assert_eq!(frames[0], json!({ "error": "missing message" }));
        assert!(frames[1]["error"].as_str().unwrap().starts_with("invalid message"));
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_sends_error() {
        let temp_dir = TempDir::new().unwrap();
        let provider = MockProvider::new().with_script(vec![MockResponse::failure(MockFailure::Authentication)]);
        let engine = engine_with(provider, &temp_dir);
        let mut session = Session::new(ProviderKind::Ollama, "mock-model", false);
        let (tx, mut rx) = mpsc::unbounded_channel();

        process_client_message(&engine, &mut session, r#"{"message":"hello"}"#, &tx).await;

        let frames = drain(&mut rx);
        assert!(frames.last().unwrap()["error"].is_string());
        assert!(session.is_idle());
    }

    #[tokio::test]
    async fn test_retry_after_partial_tokens_sends_reset() {
        let temp_dir = TempDir::new().unwrap();
        let provider = MockProvider::new().with_script(vec![
            MockResponse::cut_off("Half a sen"),
            MockResponse::text("A whole sentence."),
        ]);
        let engine = engine_with(provider, &temp_dir).with_retry_config(RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter: 0.0,
        });
        let mut session = Session::new(ProviderKind::Ollama, "mock-model", false);
        let (tx, mut rx) = mpsc::unbounded_channel();

        process_client_message(&engine, &mut session, r#"{"message":"talk"}"#, &tx).await;

        let frames = drain(&mut rx);
        let reset = frames
            .iter()
            .position(|f| f["type"] == "reset")
            .expect("reset frame");
        assert_eq!(frames[reset], json!({ "type": "reset" }));
        assert_eq!(frames[reset + 1]["type"], "warning");
        let after_reset: String = frames[reset..]
            .iter()
            .filter(|f| f["type"] == "token")
            .map(|f| f["content"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(after_reset, "A whole sentence.");
        assert_eq!(frames.last().unwrap()["type"], "done");
    }

    #[tokio::test]
    async fn test_piece_changes_forwarded() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine_with(MockProvider::new(), &temp_dir);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(forward_piece_changes(engine.sync().subscribe(), tx));

        engine.sync().record_sent("set tempo 90\nnew sample kick_909 time(1/4)");
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            serde_json::to_value(frame).unwrap(),
            json!({
                "type": "piece",
                "code": "set tempo 90\nnew sample kick_909 time(1/4)",
                "lines": 2
            })
        );

        engine.sync().record_silenced();
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            serde_json::to_value(frame).unwrap(),
            json!({ "type": "piece", "code": "", "lines": 0 })
        );

        task.abort();
    }
}
