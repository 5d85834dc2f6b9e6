// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat sessions and the conversation engine
//!
//! Everything here is shell-agnostic: the terminal REPL and the web shell
//! both hold [`Session`]s and drive them through [`ChatEngine`].

pub mod commands;
pub mod engine;
pub mod extractor;
pub mod metrics;
pub mod prompt;
pub mod session;
pub mod streaming;

pub use commands::{CommandResult, SlashCommand};
pub use engine::{ChatEngine, NoopTurnObserver, ToolOutcome, TurnObserver, TurnOutcome, MAX_TOOL_ROUNDS};
pub use metrics::ResponseMetrics;
pub use prompt::PromptBuilder;
pub use session::{Session, TurnState};
