// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management
//!
//! Handles provider selection, credentials, Playground endpoints and
//! resilience tuning. Loaded once at process start.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AgentError, Result};

mod io;

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MERCURY_URL: &str = "http://localhost:8080";
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1";

/// Name of the file (inside the playground dir) that mirrors the current piece
pub const STATE_FILE_NAME: &str = "current_piece.txt";

/// Main settings structure, optionally stored in ~/.mercury-agent/settings.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Selected LLM provider
    #[serde(default)]
    pub provider: ProviderKind,

    /// Model name (provider default when unset)
    #[serde(default)]
    pub model: Option<String>,

    /// API keys for remote providers
    #[serde(default)]
    pub api_keys: ApiKeys,

    /// Custom base URL for the configured provider
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Ollama API base URL
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,

    /// Mercury Playground base URL
    #[serde(default = "default_mercury_url")]
    pub mercury_url: String,

    /// Context window in tokens (provider default when unset)
    #[serde(default)]
    pub context_window: Option<u32>,

    /// Directory holding the current-piece state file
    #[serde(default)]
    pub playground_dir: Option<PathBuf>,

    /// Directory holding the Mercury/Hydra skill files
    #[serde(default)]
    pub skills_dir: Option<PathBuf>,

    /// Retry and timeout behavior for provider calls
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Playground sync behavior
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            api_keys: ApiKeys::default(),
            api_base_url: None,
            ollama_host: default_ollama_host(),
            mercury_url: default_mercury_url(),
            context_window: None,
            playground_dir: None,
            skills_dir: None,
            resilience: ResilienceConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

fn default_ollama_host() -> String {
    DEFAULT_OLLAMA_HOST.to_string()
}

fn default_mercury_url() -> String {
    DEFAULT_MERCURY_URL.to_string()
}

/// The LLM backends the agent can talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Ollama,
        ProviderKind::Anthropic,
        ProviderKind::OpenAi,
        ProviderKind::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "llama3",
            ProviderKind::Anthropic => "claude-sonnet-4-20250514",
            ProviderKind::OpenAi => "gpt-4o",
            ProviderKind::OpenRouter => "anthropic/claude-sonnet-4-20250514",
        }
    }

    pub fn default_context_window(&self) -> u32 {
        match self {
            ProviderKind::Ollama => 8192,
            ProviderKind::Anthropic => 200_000,
            ProviderKind::OpenAi | ProviderKind::OpenRouter => 128_000,
        }
    }

    /// Environment variable that holds this provider's API key
    pub fn key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Ollama => None,
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::OpenRouter => Some("OPENROUTER_API_KEY"),
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => DEFAULT_OLLAMA_HOST,
            ProviderKind::Anthropic => DEFAULT_ANTHROPIC_URL,
            ProviderKind::OpenAi => DEFAULT_OPENAI_URL,
            ProviderKind::OpenRouter => DEFAULT_OPENROUTER_URL,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                AgentError::Config(format!(
                    "Unknown provider: {}. Use: ollama, anthropic, openai, openrouter",
                    s
                ))
            })
    }
}

/// API keys, either provider-specific or a generic key that applies to any
/// remote provider
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openrouter: Option<String>,
}

impl ApiKeys {
    /// Key for a provider, preferring the provider-specific one
    pub fn for_kind(&self, kind: ProviderKind) -> Option<&str> {
        let specific = match kind {
            ProviderKind::Ollama => return None,
            ProviderKind::Anthropic => self.anthropic.as_deref(),
            ProviderKind::OpenAi => self.openai.as_deref(),
            ProviderKind::OpenRouter => self.openrouter.as_deref(),
        };
        specific
            .or(self.generic.as_deref())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Fully resolved connection details for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderTarget {
    Ollama { host: String },
    Anthropic { api_key: String, base_url: String },
    OpenAi { api_key: String, base_url: String },
    OpenRouter { api_key: String, base_url: String },
}

impl ProviderTarget {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderTarget::Ollama { .. } => ProviderKind::Ollama,
            ProviderTarget::Anthropic { .. } => ProviderKind::Anthropic,
            ProviderTarget::OpenAi { .. } => ProviderKind::OpenAi,
            ProviderTarget::OpenRouter { .. } => ProviderKind::OpenRouter,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            ProviderTarget::Ollama { host } => host,
            ProviderTarget::Anthropic { base_url, .. }
            | ProviderTarget::OpenAi { base_url, .. }
            | ProviderTarget::OpenRouter { base_url, .. } => base_url,
        }
    }
}

/// Resilience configuration for provider calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (cap for backoff)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter percentage (0.0 to 1.0) for randomizing delays
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Per-request timeout for provider HTTP calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter() -> f64 {
    0.25
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// Playground sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Background polling interval; 0 disables polling (pull-on-turn only)
    #[serde(default)]
    pub poll_interval_secs: u64,

    /// Timeout for Playground HTTP calls
    #[serde(default = "default_sync_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 0,
            timeout_secs: default_sync_timeout_secs(),
        }
    }
}

fn default_sync_timeout_secs() -> u64 {
    10
}

/// Command-line overrides, applied last
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub ollama_host: Option<String>,
    pub mercury_url: Option<String>,
    pub context_window: Option<u32>,
    pub playground_dir: Option<PathBuf>,
    pub skills_dir: Option<PathBuf>,
}

impl Settings {
    /// Model to use, falling back to the provider default
    pub fn model(&self) -> String {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Context window in tokens, falling back to the provider default
    pub fn context_window(&self) -> u32 {
        self.context_window
            .filter(|w| *w > 0)
            .unwrap_or_else(|| self.provider.default_context_window())
    }

    /// Token budget kept for conversation history between turns
    pub fn history_budget(&self) -> usize {
        (self.context_window() as usize / 4).min(4096)
    }

    pub fn playground_dir(&self) -> PathBuf {
        self.playground_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mercury-playground")
        })
    }

    /// Path of the plain-text file mirroring the current piece
    pub fn state_file(&self) -> PathBuf {
        self.playground_dir().join(STATE_FILE_NAME)
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.skills_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("skills"))
    }

    /// Resolve connection details for a provider.
    ///
    /// The custom base URL only applies to the provider it was configured
    /// for, so switching providers mid-session lands on that provider's
    /// public endpoint.
    pub fn provider_target(&self, kind: ProviderKind) -> Result<ProviderTarget> {
        let custom_url = if kind == self.provider {
            self.api_base_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(|u| u.trim_end_matches('/').to_string())
        } else {
            None
        };

        let api_key = || {
            self.api_keys
                .for_kind(kind)
                .map(str::to_string)
                .ok_or_else(|| {
                    AgentError::Config(format!(
                        "{} is required for the {} provider.",
                        kind.key_env().unwrap_or("API_KEY"),
                        kind
                    ))
                })
        };
        let base_url = custom_url
            .clone()
            .unwrap_or_else(|| kind.default_endpoint().to_string());

        Ok(match kind {
            ProviderKind::Ollama => ProviderTarget::Ollama {
                host: custom_url
                    .unwrap_or_else(|| self.ollama_host.trim_end_matches('/').to_string()),
            },
            ProviderKind::Anthropic => ProviderTarget::Anthropic {
                api_key: api_key()?,
                base_url,
            },
            ProviderKind::OpenAi => ProviderTarget::OpenAi {
                api_key: api_key()?,
                base_url,
            },
            ProviderKind::OpenRouter => ProviderTarget::OpenRouter {
                api_key: api_key()?,
                base_url,
            },
        })
    }

    /// Apply command-line overrides on top of the loaded settings.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(provider) = overrides.provider {
            let kind: ProviderKind = provider.parse()?;
            if kind != self.provider && overrides.model.is_none() {
                // A model chosen for the previous provider rarely exists on the new one.
                self.model = None;
            }
            self.provider = kind;
        }
        if let Some(model) = overrides.model {
            self.model = Some(model);
        }
        if let Some(key) = overrides.api_key {
            self.api_keys.generic = Some(key);
        }
        if let Some(url) = overrides.api_base_url {
            self.api_base_url = Some(url);
        }
        if let Some(host) = overrides.ollama_host {
            self.ollama_host = host;
        }
        if let Some(url) = overrides.mercury_url {
            self.mercury_url = url;
        }
        if let Some(window) = overrides.context_window {
            self.context_window = Some(window);
        }
        if let Some(dir) = overrides.playground_dir {
            self.playground_dir = Some(dir);
        }
        if let Some(dir) = overrides.skills_dir {
            self.skills_dir = Some(dir);
        }
        Ok(())
    }
}
