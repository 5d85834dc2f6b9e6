// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::time::Duration;

use mercury_agent::chat::commands;
use mercury_agent::chat::{ChatEngine, CommandResult, Session, SlashCommand, TurnObserver};
use mercury_agent::error::{AgentError, Result};
use mercury_agent::llm::message::ToolCall;
use mercury_agent::tools::ToolResult;

use crate::ui;

/// Renders a running turn to the terminal
#[derive(Default)]
struct TerminalObserver {
    /// The thinking indicator is on screen
    thinking: bool,
    /// Assistant text has started on the current line
    in_text: bool,
}

impl TerminalObserver {
    fn render(&self, result: Result<()>) {
        if let Err(e) = result {
            tracing::debug!(target: "mercury_agent::main::repl", error = %e, "terminal write failed");
        }
    }

    fn settle(&mut self) {
        if self.thinking {
            self.render(ui::clear_thinking());
            self.thinking = false;
        }
        if self.in_text {
            println!();
            self.in_text = false;
        }
    }
}

impl TurnObserver for TerminalObserver {
    fn on_thinking(&mut self) {
        self.settle();
        self.render(ui::print_thinking());
        self.thinking = true;
    }

    fn on_text_delta(&mut self, text: &str) {
        if self.thinking {
            self.render(ui::clear_thinking());
            self.thinking = false;
        }
        if !self.in_text {
            self.render(ui::print_response_prefix());
            self.in_text = true;
        }
        self.render(ui::print_text(text));
    }

    fn on_retry(&mut self, error: &AgentError, attempt: u32, delay: Duration) {
        self.settle();
        self.render(ui::print_warning(&format!(
            "{} (retry {} in {:.1}s)",
            error,
            attempt,
            delay.as_secs_f64()
        )));
    }

    fn on_reply_discarded(&mut self) {
        self.settle();
        self.render(ui::print_warning(
            "Reply interrupted; the partial text above is discarded",
        ));
    }

    fn on_tool_call(&mut self, call: &ToolCall) {
        self.settle();
        tracing::debug!(target: "mercury_agent::main::repl", tool = %call.name, "tool call");
    }

    fn on_tool_result(&mut self, name: &str, result: &ToolResult) {
        self.settle();
        self.render(ui::print_tool_line(name, result));
    }

    fn on_code_sent(&mut self, code: &str) {
        self.settle();
        self.render(ui::print_code_panel(code));
    }

    fn on_warning(&mut self, warning: &str) {
        self.settle();
        self.render(ui::print_warning(warning));
    }
}

/// Interactive loop until `/quit` or end of input
pub(super) async fn run_repl(engine: &ChatEngine, mut session: Session) -> Result<()> {
    loop {
        let input = match ui::read_user_input()? {
            Some(input) => input,
            None => break,
        };
        if input.is_empty() {
            continue;
        }

        if let Some(command) = SlashCommand::parse(&input) {
            let result = commands::execute(engine, &mut session, command).await;
            ui::print_command_result(&result)?;
            if result == CommandResult::Quit {
                break;
            }
            continue;
        }

        let mut observer = TerminalObserver::default();
        let outcome = engine.run_turn(&mut session, &input, &mut observer).await;
        observer.settle();

        match outcome {
            Ok(outcome) => ui::print_metrics(&outcome.metrics)?,
            Err(e) => ui::print_error(&e.to_string())?,
        }
        println!();
    }

    tracing::info!(
        target: "mercury_agent::main::repl",
        session_id = %session.id(),
        messages = session.len(),
        "chat ended"
    );
    Ok(())
}
