// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Slash commands
//!
//! Shared by the terminal REPL and the WebSocket shell. Commands never reach
//! the model; they act on the session or the Playground directly.

use crate::chat::engine::ChatEngine;
use crate::chat::session::Session;
use crate::config::ProviderKind;
use crate::error::Result;

pub const HELP_TEXT: &str = "\
Commands:
  /play                    Resend current piece (resume after silence)
  /silence                 Stop all sound
  /model [name]            Show or switch model
  /model <provider>:<name> Switch provider and model
  /models                  List available models
  /status                  Show current status
  /clear                   Clear conversation history
  /help                    Show this help
  /quit                    Exit";

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Play,
    Silence,
    Model(Option<String>),
    Models,
    Status,
    Clear,
    Help,
    Quit,
    Unknown(String),
}

impl SlashCommand {
    /// Parse a line starting with `/`. Returns `None` for ordinary chat text.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if !input.starts_with('/') {
            return None;
        }

        let (verb, arg) = match input.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (input, ""),
        };
        let arg = (!arg.is_empty()).then(|| arg.to_string());

        Some(match verb.to_lowercase().as_str() {
            "/play" => SlashCommand::Play,
            "/silence" => SlashCommand::Silence,
            "/model" => SlashCommand::Model(arg),
            "/models" => SlashCommand::Models,
            "/status" => SlashCommand::Status,
            "/clear" => SlashCommand::Clear,
            "/help" => SlashCommand::Help,
            "/quit" | "/exit" => SlashCommand::Quit,
            other => SlashCommand::Unknown(other.to_string()),
        })
    }
}

/// What a shell should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Informational output
    Message(String),
    /// Something went wrong or there was nothing to do
    Warning(String),
    Quit,
}

impl CommandResult {
    pub fn text(&self) -> &str {
        match self {
            CommandResult::Message(text) | CommandResult::Warning(text) => text,
            CommandResult::Quit => "Goodbye.",
        }
    }
}

/// Split `/model` arguments into an optional provider and a model name.
///
/// Only a known provider name counts as a prefix, so Ollama tags such as
/// `llama3.1:8b` stay whole.
pub fn parse_model_spec(spec: &str) -> (Option<ProviderKind>, String) {
    let spec = spec.trim();
    if let Some((prefix, model)) = spec.split_once(':') {
        if let Ok(kind) = prefix.parse::<ProviderKind>() {
            return (Some(kind), model.trim().to_string());
        }
    }
    (None, spec.to_string())
}

/// Point the session at another model (and optionally provider), probing
/// tool support. Returns whether tools are enabled.
pub async fn switch_model(engine: &ChatEngine, session: &mut Session, spec: &str) -> Result<bool> {
    let (kind, model) = parse_model_spec(spec);
    let kind = kind.unwrap_or(session.provider());
    let model = if model.is_empty() {
        kind.default_model().to_string()
    } else {
        model
    };

    let provider = engine.provider(kind)?;
    let tools = provider.supports_tools(&model).await;
    tracing::info!(
        target: "mercury_agent::chat::commands",
        from_provider = %session.provider(),
        from_model = session.model(),
        to_provider = %kind,
        to_model = %model,
        tools,
        "switching model"
    );
    session.switch_model(kind, model, tools);
    Ok(tools)
}

/// Execute a slash command against a session
pub async fn execute(engine: &ChatEngine, session: &mut Session, command: SlashCommand) -> CommandResult {
    match command {
        SlashCommand::Quit => CommandResult::Quit,
        SlashCommand::Help => CommandResult::Message(HELP_TEXT.to_string()),
        SlashCommand::Play => play(engine).await,
        SlashCommand::Silence => match engine.sync().client().silence().await {
            Ok(()) => {
                engine.sync().record_silenced();
                CommandResult::Message("Silenced.".to_string())
            }
            Err(e) => CommandResult::Warning(format!("Failed to silence Mercury: {}", e)),
        },
        SlashCommand::Model(None) => {
            CommandResult::Message(format!("Current model: {}", session.model()))
        }
        SlashCommand::Model(Some(spec)) => {
            let previous = session.provider();
            match switch_model(engine, session, &spec).await {
                Ok(tools) => {
                    let mode = if tools { "tool-calling" } else { "code-extraction" };
                    let target = if session.provider() == previous {
                        session.model().to_string()
                    } else {
                        format!("{}:{}", session.provider(), session.model())
                    };
                    CommandResult::Message(format!("Switched to {} ({})", target, mode))
                }
                Err(e) => CommandResult::Warning(e.to_string()),
            }
        }
        SlashCommand::Models => list_models(engine, session).await,
        SlashCommand::Status => CommandResult::Message(status(engine, session)),
        SlashCommand::Clear => {
            session.clear();
            CommandResult::Message("History cleared.".to_string())
        }
        SlashCommand::Unknown(verb) => CommandResult::Warning(format!("Unknown command: {}", verb)),
    }
}

async fn play(engine: &ChatEngine) -> CommandResult {
    let code = engine.sync().state().read_or_empty();
    if code.is_empty() {
        return CommandResult::Warning("No piece to play.".to_string());
    }
    match engine.sync().client().send_code(&code).await {
        Ok(()) => {
            engine.sync().record_sent(&code);
            CommandResult::Message(format!("Playing ({} lines).", code.lines().count()))
        }
        Err(e) => CommandResult::Warning(format!("Failed to send code to Mercury: {}", e)),
    }
}

async fn list_models(engine: &ChatEngine, session: &Session) -> CommandResult {
    let provider = match engine.provider(session.provider()) {
        Ok(provider) => provider,
        Err(e) => return CommandResult::Warning(e.to_string()),
    };
    match provider.list_models().await {
        Ok(models) if models.is_empty() => CommandResult::Warning("No models found".to_string()),
        Ok(models) => CommandResult::Message(
            models
                .iter()
                .map(|m| {
                    if m == session.model() {
                        format!("  {} ←", m)
                    } else {
                        format!("  {}", m)
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        Err(e) => CommandResult::Warning(format!("Could not list models: {}", e)),
    }
}

/// Multi-line status summary
pub fn status(engine: &ChatEngine, session: &Session) -> String {
    let piece = engine.sync().state().read_or_empty();
    format!(
        "  Provider: {}\n  Model: {}\n  Tools: {}\n  Piece: {} lines\n  History: {} messages",
        session.provider(),
        session.model(),
        if session.tools_enabled() { "yes" } else { "no" },
        piece.lines().count(),
        session.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::llm::factory::ProviderRegistry;
    use crate::llm::message::Message;
    use crate::llm::mock_provider::MockProvider;
    use crate::mercury::{PieceState, PlaygroundClient, PlaygroundSync};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine(uri: &str, temp_dir: &TempDir) -> ChatEngine {
        let registry = ProviderRegistry::new(Settings::default());
        registry.insert(
            ProviderKind::Ollama,
            Arc::new(MockProvider::with_name("ollama").with_models(vec![
                "llama3".to_string(),
                "qwen2.5:7b".to_string(),
            ])),
        );
        registry.insert(
            ProviderKind::Anthropic,
            Arc::new(MockProvider::with_name("anthropic").without_tools()),
        );
        let client = PlaygroundClient::new(uri, Duration::from_millis(500)).unwrap();
        let state = PieceState::new(temp_dir.path().join("current_piece.txt"));
        ChatEngine::new(registry, PlaygroundSync::new(client, state), "prompt")
    }

    fn session() -> Session {
        Session::new(ProviderKind::Ollama, "llama3", true)
    }

    #[test]
    fn test_parse() {
        assert_eq!(SlashCommand::parse("hello"), None);
        assert_eq!(SlashCommand::parse("/play"), Some(SlashCommand::Play));
        assert_eq!(SlashCommand::parse("  /QUIT "), Some(SlashCommand::Quit));
        assert_eq!(SlashCommand::parse("/model"), Some(SlashCommand::Model(None)));
        assert_eq!(
            SlashCommand::parse("/model   qwen2.5:7b"),
            Some(SlashCommand::Model(Some("qwen2.5:7b".to_string())))
        );
        assert_eq!(
            SlashCommand::parse("/dance now"),
            Some(SlashCommand::Unknown("/dance".to_string()))
        );
    }

    #[test]
    fn test_parse_model_spec() {
        assert_eq!(parse_model_spec("llama3.1:8b"), (None, "llama3.1:8b".to_string()));
        assert_eq!(
            parse_model_spec("anthropic:claude-sonnet-4-20250514"),
            (
                Some(ProviderKind::Anthropic),
                "claude-sonnet-4-20250514".to_string()
            )
        );
        assert_eq!(
            parse_model_spec("openrouter:meta-llama/llama-3-70b"),
            (
                Some(ProviderKind::OpenRouter),
                "meta-llama/llama-3-70b".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_unknown_and_help() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine("http://127.0.0.1:9", &temp_dir);
        let mut session = session();

        let result = execute(&engine, &mut session, SlashCommand::Unknown("/x".to_string())).await;
        assert_eq!(result, CommandResult::Warning("Unknown command: /x".to_string()));

        let help = execute(&engine, &mut session, SlashCommand::Help).await;
        assert!(help.text().contains("/silence"));
        assert_eq!(execute(&engine, &mut session, SlashCommand::Quit).await, CommandResult::Quit);
    }

    #[tokio::test]
    async fn test_model_show_and_switch_keeps_history() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine("http://127.0.0.1:9", &temp_dir);
        let mut session = session();
        session.append(Message::user("hi")).unwrap();
        session.append(Message::assistant("hello")).unwrap();

        let shown = execute(&engine, &mut session, SlashCommand::Model(None)).await;
        assert_eq!(shown.text(), "Current model: llama3");

        let switched = execute(
            &engine,
            &mut session,
            SlashCommand::Model(Some("anthropic:claude-sonnet-4-20250514".to_string())),
        )
        .await;
        assert_eq!(
            switched.text(),
            "Switched to anthropic:claude-sonnet-4-20250514 (code-extraction)"
        );
        assert_eq!(session.provider(), ProviderKind::Anthropic);
        assert!(!session.tools_enabled());
        assert_eq!(session.len(), 2);
    }

    #[tokio::test]
    async fn test_switch_to_unconfigured_provider_fails() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine("http://127.0.0.1:9", &temp_dir);
        let mut session = session();

        let result = execute(
            &engine,
            &mut session,
            SlashCommand::Model(Some("openai:gpt-4o".to_string())),
        )
        .await;
        assert!(matches!(result, CommandResult::Warning(ref w) if w.contains("OPENAI_API_KEY")));
        assert_eq!(session.provider(), ProviderKind::Ollama);
    }

    #[tokio::test]
    async fn test_models_marks_current() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine("http://127.0.0.1:9", &temp_dir);
        let mut session = session();

        let result = execute(&engine, &mut session, SlashCommand::Models).await;
        assert_eq!(result.text(), "  llama3 ←\n  qwen2.5:7b");
    }

    #[tokio::test]
    async fn test_play_resends_state_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/code"))
            .and(body_json(serde_json::json!({ "code": "set tempo 90\nnew sample kick_909" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&server.uri(), &temp_dir);
        let mut session = session();

        let empty = execute(&engine, &mut session, SlashCommand::Play).await;
        assert_eq!(empty, CommandResult::Warning("No piece to play.".to_string()));

        engine.sync().state().write("set tempo 90\nnew sample kick_909").unwrap();
        let played = execute(&engine, &mut session, SlashCommand::Play).await;
        assert_eq!(played.text(), "Playing (2 lines).");
    }

    #[tokio::test]
    async fn test_silence_keeps_state_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/silence"))
            .and(body_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&server.uri(), &temp_dir);
        engine.sync().state().write("set tempo 90").unwrap();
        let mut session = session();

        let result = execute(&engine, &mut session, SlashCommand::Silence).await;
        assert_eq!(result.text(), "Silenced.");
        assert_eq!(engine.sync().state().read().unwrap(), "set tempo 90");
    }

    #[tokio::test]
    async fn test_status_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine("http://127.0.0.1:9", &temp_dir);
        engine.sync().state().write("a\nb\nc").unwrap();
        let mut session = session();
        session.append(Message::user("hi")).unwrap();

        let text = status(&engine, &session);
        assert!(text.contains("Provider: ollama"));
        assert!(text.contains("Tools: yes"));
        assert!(text.contains("Piece: 3 lines"));
        assert!(text.contains("History: 1 messages"));

        let cleared = execute(&engine, &mut session, SlashCommand::Clear).await;
        assert_eq!(cleared.text(), "History cleared.");
        assert!(session.is_empty());
    }
}
