// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::PathBuf;

use clap::Parser;
use mercury_agent::cli::{Cli, Commands};
use mercury_agent::config::ConfigOverrides;

#[test]
fn test_parse_chat_command() {
    let cli = Cli::try_parse_from(["mercury-agent", "chat"]).expect("Valid command parsing");
    assert_eq!(cli.command, Some(Commands::Chat));
}

#[test]
fn test_parse_models_command() {
    let cli = Cli::try_parse_from(["mercury-agent", "models", "--provider", "ollama"])
        .expect("Valid command parsing");
    assert_eq!(cli.command, Some(Commands::Models));
    assert_eq!(cli.config.provider.as_deref(), Some("ollama"));
}

#[test]
fn test_parse_web_with_port() {
    let cli = Cli::try_parse_from(["mercury-agent", "web", "-p", "8000", "--host", "127.0.0.1"])
        .expect("Valid command parsing");
    if let Some(Commands::Web(args)) = cli.command {
        assert_eq!(args.port, 8000);
        assert_eq!(args.host, "127.0.0.1");
    } else {
        panic!("Expected Web command");
    }
}

#[test]
fn test_all_startup_flags_reach_overrides() {
    let cli = Cli::try_parse_from([
        "mercury-agent",
        "--provider",
        "anthropic",
        "-m",
        "claude-test",
        "--api-key",
        "k",
        "--api-base-url",
        "http://proxy",
        "--ollama-host",
        "http://gpu:11434",
        "--mercury-url",
        "http://studio:8080",
        "--context-window",
        "16000",
        "--playground-dir",
        "/srv/pg",
        "--skills-dir",
        "/srv/skills",
    ])
    .expect("Valid command parsing");
    assert!(cli.command.is_none());

    let overrides = ConfigOverrides::from(cli.config);
    assert_eq!(overrides.provider.as_deref(), Some("anthropic"));
    assert_eq!(overrides.model.as_deref(), Some("claude-test"));
    assert_eq!(overrides.api_key.as_deref(), Some("k"));
    assert_eq!(overrides.api_base_url.as_deref(), Some("http://proxy"));
    assert_eq!(overrides.ollama_host.as_deref(), Some("http://gpu:11434"));
    assert_eq!(overrides.mercury_url.as_deref(), Some("http://studio:8080"));
    assert_eq!(overrides.context_window, Some(16000));
    assert_eq!(overrides.playground_dir, Some(PathBuf::from("/srv/pg")));
    assert_eq!(overrides.skills_dir, Some(PathBuf::from("/srv/skills")));
}

#[test]
fn test_invalid_context_window_rejected() {
    assert!(Cli::try_parse_from(["mercury-agent", "--context-window", "lots"]).is_err());
}
