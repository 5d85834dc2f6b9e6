// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ConfigOverrides;

/// Mercury agent - chat with an LLM that live-codes the Mercury Playground
#[derive(Parser, Debug)]
#[command(name = "mercury-agent")]
#[command(version, about = "Chat with an LLM that live-codes the Mercury Playground")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the interactive terminal chat (default when no command given)
    Chat,

    /// Serve the browser chat panel
    Web(WebArgs),

    /// List the models the configured provider offers
    Models,

    /// Build the system prompt and print or save it
    Prompt(PromptArgs),
}

/// Startup configuration flags; they override settings.json and the
/// environment.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigArgs {
    /// LLM provider: ollama, anthropic, openai, openrouter
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Model name
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// API key (for anthropic/openai/openrouter)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Custom API base URL for the selected provider
    #[arg(long, global = true)]
    pub api_base_url: Option<String>,

    /// Ollama API base URL
    #[arg(long, global = true)]
    pub ollama_host: Option<String>,

    /// Mercury Playground base URL
    #[arg(long, global = true)]
    pub mercury_url: Option<String>,

    /// Context window size in tokens
    #[arg(long, global = true)]
    pub context_window: Option<u32>,

    /// Directory holding current_piece.txt
    #[arg(long, global = true)]
    pub playground_dir: Option<PathBuf>,

    /// Directory holding the skill documents
    #[arg(long, global = true)]
    pub skills_dir: Option<PathBuf>,
}

impl From<ConfigArgs> for ConfigOverrides {
    fn from(args: ConfigArgs) -> Self {
        ConfigOverrides {
            provider: args.provider,
            model: args.model,
            api_key: args.api_key,
            api_base_url: args.api_base_url,
            ollama_host: args.ollama_host,
            mercury_url: args.mercury_url,
            context_window: args.context_window,
            playground_dir: args.playground_dir,
            skills_dir: args.skills_dir,
        }
    }
}

/// Arguments for the web command
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct WebArgs {
    /// Bind host
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Bind port
    #[arg(short, long, default_value_t = 3000)]
    pub port: u16,
}

/// Arguments for the prompt command
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PromptArgs {
    /// Save the prompt to this file instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
