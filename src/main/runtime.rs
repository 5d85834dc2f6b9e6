// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::Arc;
use std::time::Duration;

use mercury_agent::chat::{ChatEngine, PromptBuilder, Session};
use mercury_agent::config::{ProviderKind, Settings};
use mercury_agent::error::{AgentError, Result};
use mercury_agent::llm::factory::ProviderRegistry;
use mercury_agent::mercury::{PieceState, PlaygroundClient, PlaygroundSync, PollHandle};

use crate::ui;

/// Everything a shell needs after boot
pub(super) struct Runtime {
    pub engine: Arc<ChatEngine>,
    pub session: Session,
    /// Background Playground poller, when enabled
    pub poller: Option<PollHandle>,
    pub playground_ok: bool,
}

/// Run the boot checks and build the engine plus a default session.
///
/// An unreachable provider or an Ollama model that is not pulled is fatal.
/// An unhealthy Playground only warns.
pub(super) async fn boot(settings: Settings) -> Result<Runtime> {
    let kind = settings.provider;
    let model = settings.model();
    let target = settings.provider_target(kind)?;
    let poll_interval = settings.sync.poll_interval_secs;
    let sync_timeout = Duration::from_secs(settings.sync.timeout_secs);
    let mercury_url = settings.mercury_url.clone();
    let state_file = settings.state_file();
    let prompt_builder = PromptBuilder::new(settings.skills_dir(), settings.context_window());

    let registry = ProviderRegistry::new(settings);
    let provider = registry.get(kind)?;

    if !provider.is_available().await {
        return Err(AgentError::Config(format!(
            "{} is not reachable at {}",
            kind,
            target.endpoint()
        )));
    }

    if kind == ProviderKind::Ollama {
        let available = provider.list_models().await?;
        check_model_pulled(&available, &model)?;
    }

    let client = PlaygroundClient::new(mercury_url, sync_timeout)?;
    let playground_ok = client.health_check().await;
    if !playground_ok {
        tracing::warn!(
            target: "mercury_agent::main::runtime",
            url = client.base_url(),
            "mercury playground is not reachable"
        );
        ui::print_warning(&format!(
            "Mercury Playground not reachable at {}; code will not play until it is up.",
            client.base_url()
        ))?;
    }

    let system_prompt = prompt_builder.build();
    tracing::info!(
        target: "mercury_agent::main::runtime",
        chars = system_prompt.chars().count(),
        skills = prompt_builder.skill_paths().len(),
        "system prompt built"
    );

    let sync = PlaygroundSync::new(client, PieceState::new(state_file));
    let poller = (poll_interval > 0).then(|| sync.spawn_polling(Duration::from_secs(poll_interval)));

    let engine = Arc::new(ChatEngine::new(registry, sync, system_prompt));
    let session = engine.open_session().await?;
    if !session.tools_enabled() {
        ui::print_warning(&format!(
            "{} does not support tool calling; falling back to code extraction.",
            session.model()
        ))?;
    }

    Ok(Runtime {
        engine,
        session,
        poller,
        playground_ok,
    })
}

/// Whether `model` is among the pulled Ollama tags. A bare name matches its
/// `:latest` tag.
pub(super) fn is_model_pulled(available: &[String], model: &str) -> bool {
    available.iter().any(|name| {
        name == model
            || name
                .strip_suffix(":latest")
                .is_some_and(|base| base == model)
            || model
                .strip_suffix(":latest")
                .is_some_and(|base| base == name)
    })
}

fn check_model_pulled(available: &[String], model: &str) -> Result<()> {
    if is_model_pulled(available, model) {
        return Ok(());
    }
    let listing = if available.is_empty() {
        "  (none)".to_string()
    } else {
        available
            .iter()
            .map(|m| format!("  {}", m))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Err(AgentError::Config(format!(
        "Model '{}' is not pulled in Ollama.\nAvailable models:\n{}\nPull it first: ollama pull {}",
        model, listing, model
    )))
}
