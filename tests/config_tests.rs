// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::collections::HashMap;
use std::path::PathBuf;

use mercury_agent::config::{ConfigOverrides, ProviderKind, ProviderTarget, Settings};
use tempfile::TempDir;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| vars.get(name).cloned()
}

#[test]
fn test_layers_apply_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{
            "provider": "anthropic",
            "model": "claude-from-file",
            "mercury_url": "http://file:8080",
            "api_keys": { "anthropic": "file-key" }
        }"#,
    )
    .unwrap();

    let mut settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.provider, ProviderKind::Anthropic);
    assert_eq!(settings.model(), "claude-from-file");

    settings
        .apply_env(lookup(&[
            ("MERCURY_URL", "http://env:8080"),
            ("CONTEXT_WINDOW", "64000"),
        ]))
        .unwrap();
    assert_eq!(settings.mercury_url, "http://env:8080");
    assert_eq!(settings.context_window(), 64000);

    settings
        .apply_overrides(ConfigOverrides {
            mercury_url: Some("http://cli:9000".to_string()),
            playground_dir: Some(PathBuf::from("/tmp/pg")),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(settings.mercury_url, "http://cli:9000");
    assert_eq!(settings.model(), "claude-from-file");
    assert_eq!(
        settings.state_file(),
        PathBuf::from("/tmp/pg/current_piece.txt")
    );

    match settings.provider_target(ProviderKind::Anthropic).unwrap() {
        ProviderTarget::Anthropic { api_key, base_url } => {
            assert_eq!(api_key, "file-key");
            assert_eq!(base_url, "https://api.anthropic.com");
        }
        other => panic!("unexpected target: {:?}", other),
    }
}

#[test]
fn test_provider_override_resets_foreign_model() {
    let mut settings = Settings::default();
    settings
        .apply_env(lookup(&[("MODEL", "llama3.1:8b")]))
        .unwrap();

    settings
        .apply_overrides(ConfigOverrides {
            provider: Some("openai".to_string()),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(settings.provider, ProviderKind::OpenAi);
    assert_eq!(settings.model(), "gpt-4o");
    assert_eq!(settings.context_window(), 128000);
}

#[test]
fn test_remote_provider_without_key_is_configuration_error() {
    let mut settings = Settings::default();
    settings
        .apply_overrides(ConfigOverrides {
            provider: Some("openrouter".to_string()),
            ..Default::default()
        })
        .unwrap();

    let err = settings
        .provider_target(ProviderKind::OpenRouter)
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("OPENROUTER_API_KEY"));
}

#[test]
fn test_unknown_provider_rejected() {
    let mut settings = Settings::default();
    let err = settings
        .apply_env(lookup(&[("PROVIDER", "gemini")]))
        .unwrap_err();
    assert!(err.to_string().contains("Unknown provider"));
}
