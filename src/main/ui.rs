// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Write};

use crossterm::{
    cursor::MoveToColumn,
    style::{Color, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
    ExecutableCommand,
};

use mercury_agent::chat::{CommandResult, ResponseMetrics, Session};
use mercury_agent::error::Result;
use mercury_agent::tools::ToolResult;

/// Longest tool output shown on a tool line
const TOOL_PREVIEW_CHARS: usize = 60;

/// First line of `text`, shortened to `max` characters
pub(super) fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

fn print_colored(color: Color, text: &str) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(color))?;
    println!("{}", text);
    stdout.execute(ResetColor)?;
    stdout.flush()?;
    Ok(())
}

pub(super) fn print_info(text: &str) -> Result<()> {
    print_colored(Color::Cyan, text)
}

pub(super) fn print_warning(text: &str) -> Result<()> {
    print_colored(Color::Yellow, &format!("⚠ {}", text))
}

/// Errors go to stderr with the rest of the diagnostics
pub(super) fn print_error(text: &str) -> Result<()> {
    let mut stderr = io::stderr();
    stderr.execute(SetForegroundColor(Color::Red))?;
    eprintln!("Error: {}", text);
    stderr.execute(ResetColor)?;
    Ok(())
}

/// Print welcome banner
pub(super) fn print_welcome(session: &Session, mercury_url: &str, playground_ok: bool) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    println!("mercury-agent v{}", env!("CARGO_PKG_VERSION"));
    stdout.execute(ResetColor)?;
    println!("Provider: {}", session.provider());
    println!(
        "Model: {} ({})",
        session.model(),
        if session.tools_enabled() {
            "tool-calling"
        } else {
            "code-extraction"
        }
    );
    println!(
        "Playground: {} {}",
        mercury_url,
        if playground_ok { "✓" } else { "✗" }
    );
    println!("Type /help for commands, /quit to exit\n");
    stdout.flush()?;
    Ok(())
}

/// Read a line of user input. `None` on end of input.
pub(super) fn read_user_input() -> Result<Option<String>> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Green))?;
    print!("you: ");
    stdout.execute(ResetColor)?;
    stdout.flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

pub(super) fn print_thinking() -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    print!("thinking…");
    stdout.execute(ResetColor)?;
    stdout.flush()?;
    Ok(())
}

/// Erase the thinking indicator from the current line
pub(super) fn clear_thinking() -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(Clear(ClearType::CurrentLine))?;
    stdout.execute(MoveToColumn(0))?;
    stdout.flush()?;
    Ok(())
}

pub(super) fn print_response_prefix() -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    print!("mercury: ");
    stdout.execute(ResetColor)?;
    stdout.flush()?;
    Ok(())
}

pub(super) fn print_text(text: &str) -> Result<()> {
    print!("{}", text);
    io::stdout().flush()?;
    Ok(())
}

/// `tool:<name> → <preview>`
pub(super) fn print_tool_line(name: &str, result: &ToolResult) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    print!("  tool:");
    stdout.execute(SetForegroundColor(Color::Magenta))?;
    print!("{}", name);
    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    print!(" → ");
    let color = if result.is_error() {
        Color::Red
    } else {
        Color::Green
    };
    stdout.execute(SetForegroundColor(color))?;
    println!("{}", preview(result.output_text(), TOOL_PREVIEW_CHARS));
    stdout.execute(ResetColor)?;
    stdout.flush()?;
    Ok(())
}

/// Boxed panel with the code that reached the Playground
pub(super) fn print_code_panel(code: &str) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    println!("  ╭─ sent to Mercury ({} lines)", code.lines().count());
    for line in code.lines() {
        stdout.execute(SetForegroundColor(Color::DarkGrey))?;
        print!("  │ ");
        stdout.execute(SetForegroundColor(Color::Blue))?;
        println!("{}", line);
    }
    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    println!("  ╰─");
    stdout.execute(ResetColor)?;
    stdout.flush()?;
    Ok(())
}

pub(super) fn print_metrics(metrics: &ResponseMetrics) -> Result<()> {
    print_colored(Color::DarkGrey, &format!("  {}", metrics.format_compact()))
}

pub(super) fn print_command_result(result: &CommandResult) -> Result<()> {
    match result {
        CommandResult::Message(text) => {
            println!("{}", text);
            Ok(())
        }
        CommandResult::Warning(text) => print_warning(text),
        CommandResult::Quit => print_info(result.text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_takes_first_line() {
        assert_eq!(preview("Code sent.\nsecond", 60), "Code sent.");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let text = "é".repeat(70);
        let shown = preview(&text, 10);
        assert_eq!(shown, format!("{}...", "é".repeat(7)));
    }

    #[test]
    fn test_preview_empty() {
        assert_eq!(preview("", 10), "");
    }
}
