// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mercury agent - an LLM chat agent that live-codes the Mercury Playground.
//!
//! This crate exposes the shared runtime used by:
//! - the `mercury-agent` terminal REPL (`src/main.rs`)
//! - the browser chat panel served by [`web`]
//!
//! Architecture highlights:
//! - `chat`: sessions, the turn engine, slash commands and the prompt builder
//! - `llm`: provider abstraction and implementations (Ollama/Anthropic/OpenAI/OpenRouter)
//! - `mercury`: Playground HTTP client, state file and piece sync
//! - `tools`: the `send_code`/`silence`/`get_current_piece` tools
//! - `config`: settings file, environment and startup overrides

pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod mercury;
pub mod tools;
pub mod web;

pub use error::{AgentError, Result};
