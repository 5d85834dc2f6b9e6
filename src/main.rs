// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mercury agent - chat with an LLM that live-codes the Mercury Playground
//!
//! Entry point for the `mercury-agent` binary.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mercury_agent::chat::prompt::save_prompt;
use mercury_agent::chat::PromptBuilder;
use mercury_agent::cli::{Cli, Commands, PromptArgs, WebArgs};
use mercury_agent::config::Settings;
use mercury_agent::error::Result;
use mercury_agent::llm::factory::ProviderRegistry;
use mercury_agent::web::{self, AppState};

#[path = "main/repl.rs"]
mod repl;
#[path = "main/runtime.rs"]
mod runtime;
#[path = "main/ui.rs"]
mod ui;

use runtime::{boot, Runtime};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        let _ = ui::print_error(&e.to_string());
        std::process::exit(1);
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.into())?;
    tracing::debug!(
        target: "mercury_agent::main",
        provider = %settings.provider,
        model = %settings.model(),
        mercury_url = %settings.mercury_url,
        "settings loaded"
    );

    match cli.command {
        None | Some(Commands::Chat) => run_chat(settings).await,
        Some(Commands::Web(args)) => run_web(settings, args).await,
        Some(Commands::Models) => run_models(settings).await,
        Some(Commands::Prompt(args)) => run_prompt(settings, args),
    }
}

async fn run_chat(settings: Settings) -> Result<()> {
    let Runtime {
        engine,
        session,
        poller: _poller,
        playground_ok,
    } = boot(settings).await?;

    ui::print_welcome(&session, engine.sync().client().base_url(), playground_ok)?;
    repl::run_repl(&engine, session).await
}

async fn run_web(settings: Settings, args: WebArgs) -> Result<()> {
    let Runtime {
        engine,
        session,
        poller: _poller,
        playground_ok,
    } = boot(settings).await?;

    ui::print_welcome(&session, engine.sync().client().base_url(), playground_ok)?;
    ui::print_info(&format!("Web chat on http://{}:{}", args.host, args.port))?;
    web::serve(AppState::new(engine, session), &args.host, args.port).await
}

async fn run_models(settings: Settings) -> Result<()> {
    let kind = settings.provider;
    let current = settings.model();
    let registry = ProviderRegistry::new(settings);
    let models = registry.get(kind)?.list_models().await?;

    if models.is_empty() {
        ui::print_warning(&format!("No models found for {}", kind))?;
        return Ok(());
    }
    for model in models {
        if model == current {
            println!("  {} ←", model);
        } else {
            println!("  {}", model);
        }
    }
    Ok(())
}

fn run_prompt(settings: Settings, args: PromptArgs) -> Result<()> {
    let prompt = PromptBuilder::new(settings.skills_dir(), settings.context_window()).build();
    match args.output {
        Some(path) => {
            save_prompt(&prompt, &path)?;
            ui::print_info(&format!(
                "Saved system prompt to {} ({} chars)",
                path.display(),
                prompt.chars().count()
            ))?;
        }
        None => println!("{}", prompt),
    }
    Ok(())
}
