// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! HTTP routes for the web shell
//!
//! The REST endpoints share one default session; every WebSocket connection
//! gets its own.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::chat::commands::switch_model;
use crate::chat::{ChatEngine, NoopTurnObserver, Session};
use crate::error::{AgentError, Result};

use super::ws;

const INDEX_HTML: &str = include_str!("static/index.html");

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChatEngine>,
    /// Session used by the REST endpoints
    pub session: Arc<Mutex<Session>>,
}

impl AppState {
    pub fn new(engine: Arc<ChatEngine>, session: Session) -> Self {
        Self {
            engine,
            session: Arc::new(Mutex::new(session)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct ModelRequest {
    #[serde(default)]
    model: String,
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/api/models", get(models))
        .route("/api/model", post(set_model))
        .route("/api/chat", post(chat))
        .route("/api/play", post(play))
        .route("/api/silence", post(silence))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!(target: "mercury_agent::web::server", %addr, "web shell listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(target: "mercury_agent::web::server", "web shell shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(
            target: "mercury_agent::web::server",
            error = %e,
            "failed to listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
    tracing::info!(target: "mercury_agent::web::server", "received shutdown signal");
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn status_for(error: &AgentError) -> StatusCode {
    match error {
        AgentError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AgentError::Session(_) => StatusCode::CONFLICT,
        AgentError::Api(_) | AgentError::Playground(_) | AgentError::Http(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let (provider_kind, model, tools, history_len) = {
        let session = state.session.lock().await;
        (
            session.provider(),
            session.model().to_string(),
            session.tools_enabled(),
            session.len(),
        )
    };
    let engine = &state.engine;
    let piece = engine.sync().state().read_or_empty();
    let mercury_ok = engine.sync().client().health_check().await;
    let llm_ok = match engine.provider(provider_kind) {
        Ok(provider) => provider.is_available().await,
        Err(_) => false,
    };

    Json(json!({
        "provider": provider_kind.as_str(),
        "model": model,
        "tools": tools,
        "piece_lines": piece.lines().count(),
        "history_len": history_len,
        "mercury_ok": mercury_ok,
        "llm_ok": llm_ok,
    }))
}

async fn models(State(state): State<AppState>) -> Json<Value> {
    let (provider_kind, current) = {
        let session = state.session.lock().await;
        (session.provider(), session.model().to_string())
    };

    let models = match state.engine.provider(provider_kind) {
        Ok(provider) => provider.list_models().await,
        Err(e) => Err(e),
    }
    .unwrap_or_else(|e| {
        tracing::warn!(
            target: "mercury_agent::web::server",
            provider = %provider_kind,
            error = %e,
            "could not list models"
        );
        Vec::new()
    });

    Json(json!({ "models": models, "current": current }))
}

async fn set_model(State(state): State<AppState>, Json(body): Json<ModelRequest>) -> Response {
    let mut session = state.session.lock().await;
    let name = body.model.trim();
    if !name.is_empty() {
        if let Err(e) = switch_model(&state.engine, &mut session, name).await {
            return error_response(status_for(&e), e.to_string());
        }
    }
    Json(json!({ "model": session.model(), "tools": session.tools_enabled() })).into_response()
}

async fn chat(State(state): State<AppState>, Json(body): Json<ChatRequest>) -> Response {
    if body.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "missing message");
    }

    let mut session = state.session.lock().await;
    match state
        .engine
        .run_turn(&mut session, &body.message, &mut NoopTurnObserver)
        .await
    {
        Ok(outcome) => {
            let tool_results: Vec<&str> = outcome
                .tool_results
                .iter()
                .map(|t| t.result.as_str())
                .collect();
            Json(json!({
                "reply": outcome.reply,
                "code": outcome.code,
                "tool_results": tool_results,
                "metrics": outcome.metrics.to_json(),
                "warnings": outcome.warnings,
            }))
            .into_response()
        }
        Err(e) => error_response(status_for(&e), e.to_string()),
    }
}

async fn play(State(state): State<AppState>) -> Response {
    let sync = state.engine.sync();
    let code = sync.state().read_or_empty();
    if code.is_empty() {
        return Json(json!({ "status": "no_piece", "code": null })).into_response();
    }
    match sync.client().send_code(&code).await {
        Ok(()) => {
            sync.record_sent(&code);
            Json(json!({ "status": "playing", "code": code })).into_response()
        }
        Err(e) => error_response(status_for(&e), e.to_string()),
    }
}

async fn silence(State(state): State<AppState>) -> Response {
    let sync = state.engine.sync();
    match sync.client().silence().await {
        Ok(()) => {
            sync.record_silenced();
            Json(json!({ "status": "silenced" })).into_response()
        }
        Err(e) => error_response(status_for(&e), e.to_string()),
    }
}
