// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider factory for creating LLM providers
//!
//! Centralizes provider construction for the shells and keeps one live
//! instance per backend so `/model provider:name` can switch mid-session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;

use crate::config::{ProviderKind, ProviderTarget, ResilienceConfig, Settings};
use crate::error::{AgentError, Result};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::{
    AnthropicProvider, OllamaProvider, OpenAiCompatibleProvider, OpenAiFlavor,
};

/// Factory for creating LLM providers
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider for a resolved target
    pub fn create(
        target: &ProviderTarget,
        resilience: &ResilienceConfig,
    ) -> Result<Arc<dyn LlmProvider>> {
        let client = Self::http_client(resilience)?;

        tracing::debug!(
            target: "mercury_agent::llm::factory",
            provider = %target.kind(),
            endpoint = target.endpoint(),
            "creating provider"
        );

        let provider: Arc<dyn LlmProvider> = match target {
            ProviderTarget::Ollama { host } => {
                Arc::new(OllamaProvider::with_base_url(host).with_http_client(client))
            }
            ProviderTarget::Anthropic { api_key, base_url } => Arc::new(
                AnthropicProvider::with_base_url(api_key, base_url).with_http_client(client),
            ),
            ProviderTarget::OpenAi { api_key, base_url } => Arc::new(
                OpenAiCompatibleProvider::with_base_url(OpenAiFlavor::OpenAi, api_key, base_url)
                    .with_http_client(client),
            ),
            ProviderTarget::OpenRouter { api_key, base_url } => Arc::new(
                OpenAiCompatibleProvider::with_base_url(
                    OpenAiFlavor::OpenRouter,
                    api_key,
                    base_url,
                )
                .with_http_client(client),
            ),
        };

        Ok(provider)
    }

    fn http_client(resilience: &ResilienceConfig) -> Result<Client> {
        let mut builder = Client::builder().connect_timeout(Duration::from_secs(10));
        if resilience.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(resilience.request_timeout_secs));
        }
        builder
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {}", e)))
    }
}

/// Lazily-built providers, one per backend
pub struct ProviderRegistry {
    settings: Settings,
    providers: Mutex<HashMap<ProviderKind, Arc<dyn LlmProvider>>>,
}

impl ProviderRegistry {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            providers: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Register an already-built provider (used for injection in tests)
    pub fn insert(&self, kind: ProviderKind, provider: Arc<dyn LlmProvider>) {
        if let Ok(mut providers) = self.providers.lock() {
            providers.insert(kind, provider);
        }
    }

    /// Provider for `kind`, creating it on first use.
    ///
    /// A missing API key surfaces here as a configuration error.
    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn LlmProvider>> {
        let mut providers = self
            .providers
            .lock()
            .map_err(|_| AgentError::Config("provider registry lock poisoned".to_string()))?;

        if let Some(provider) = providers.get(&kind) {
            return Ok(Arc::clone(provider));
        }

        let target = self.settings.provider_target(kind)?;
        let provider = ProviderFactory::create(&target, &self.settings.resilience)?;
        providers.insert(kind, Arc::clone(&provider));
        Ok(provider)
    }
}
