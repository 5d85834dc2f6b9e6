// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::{Path, PathBuf};

use crate::error::{AgentError, Result};

use super::{ConfigOverrides, ProviderKind, Settings};

impl Settings {
    /// Agent home directory (`MERCURY_AGENT_HOME`, default `~/.mercury-agent`).
    pub fn agent_home() -> PathBuf {
        if let Ok(home) = std::env::var("MERCURY_AGENT_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mercury-agent")
    }

    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::agent_home().join("settings.json")
    }

    /// Load settings from the default file, the process environment and the
    /// given command-line overrides, in that order.
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let mut settings = Self::load_from(&Self::default_path())?;
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.apply_overrides(overrides)?;
        tracing::debug!(
            target: "mercury_agent::config",
            provider = %settings.provider,
            model = %settings.model(),
            mercury_url = %settings.mercury_url,
            context_window = settings.context_window(),
            "settings loaded"
        );
        Ok(settings)
    }

    /// Load settings from a specific path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content).map_err(|e| {
            AgentError::Config(format!("invalid settings file {}: {}", path.display(), e))
        })?;
        Ok(settings)
    }

    /// Apply environment variables through an injectable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("PROVIDER") {
            self.provider = provider.parse::<ProviderKind>()?;
        }
        if let Some(model) = get("MODEL") {
            self.model = Some(model);
        }
        if let Some(key) = get("API_KEY") {
            self.api_keys.generic = Some(key);
        }
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.api_keys.anthropic = Some(key);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.api_keys.openai = Some(key);
        }
        if let Some(key) = get("OPENROUTER_API_KEY") {
            self.api_keys.openrouter = Some(key);
        }
        if let Some(url) = get("API_BASE_URL") {
            self.api_base_url = Some(url);
        }
        if let Some(host) = get("OLLAMA_HOST") {
            self.ollama_host = host;
        }
        if let Some(url) = get("MERCURY_URL") {
            self.mercury_url = url;
        }
        if let Some(window) = get("CONTEXT_WINDOW") {
            let parsed = window.trim().parse::<u32>().map_err(|_| {
                AgentError::Config(format!("CONTEXT_WINDOW must be a number, got '{}'", window))
            })?;
            self.context_window = Some(parsed);
        }
        if let Some(dir) = get("MERCURY_PLAYGROUND_DIR") {
            self.playground_dir = Some(expand_home(&dir));
        }
        if let Some(dir) = get("MERCURY_SKILLS_DIR") {
            self.skills_dir = Some(expand_home(&dir));
        }
        Ok(())
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_apply_env() {
        let vars = env(&[
            ("PROVIDER", "openrouter"),
            ("OPENROUTER_API_KEY", "or-key"),
            ("MERCURY_URL", "http://studio:8080"),
            ("CONTEXT_WINDOW", "32000"),
            ("MERCURY_PLAYGROUND_DIR", "/srv/pg"),
        ]);
        let mut settings = Settings::default();
        settings.apply_env(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(settings.provider, ProviderKind::OpenRouter);
        assert_eq!(settings.model(), "anthropic/claude-sonnet-4-20250514");
        assert_eq!(settings.mercury_url, "http://studio:8080");
        assert_eq!(settings.context_window(), 32000);
        assert_eq!(settings.state_file(), PathBuf::from("/srv/pg/current_piece.txt"));
        assert_eq!(
            settings.api_keys.for_kind(ProviderKind::OpenRouter),
            Some("or-key")
        );
    }

    #[test]
    fn test_apply_env_ignores_blank_values() {
        let vars = env(&[("MODEL", "  "), ("PROVIDER", "")]);
        let mut settings = Settings::default();
        settings.apply_env(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.provider, ProviderKind::Ollama);
        assert_eq!(settings.model(), "llama3");
    }

    #[test]
    fn test_apply_env_bad_context_window() {
        let vars = env(&[("CONTEXT_WINDOW", "lots")]);
        let mut settings = Settings::default();
        let err = settings.apply_env(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("CONTEXT_WINDOW"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&temp_dir.path().join("nope.json")).unwrap();
        assert_eq!(settings.provider, ProviderKind::Ollama);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"provider": "anthropic", "model": "claude-3-5-haiku-20241022", "sync": {"poll_interval_secs": 5}}"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.provider, ProviderKind::Anthropic);
        assert_eq!(settings.model(), "claude-3-5-haiku-20241022");
        assert_eq!(settings.sync.poll_interval_secs, 5);
    }

    #[test]
    fn test_load_from_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("invalid settings file"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/pg"), home.join("pg"));
        }
    }
}
