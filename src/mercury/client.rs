// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! HTTP client for the Mercury Playground API

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::DEFAULT_MERCURY_URL;
use crate::error::{AgentError, Result};

/// Thin client over the Playground endpoints.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct PlaygroundClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CodeRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct SilenceRequest {}

#[derive(Debug, Deserialize)]
struct CodeResponse {
    #[serde(default)]
    code: Option<String>,
}

impl PlaygroundClient {
    /// Create a client for the Playground at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Create a client for the default local Playground.
    pub fn local() -> Result<Self> {
        Self::new(DEFAULT_MERCURY_URL, Duration::from_secs(10))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the running piece with `code`. The string is sent verbatim.
    pub async fn send_code(&self, code: &str) -> Result<()> {
        let url = format!("{}/api/code", self.base_url);
        tracing::debug!(
            target: "mercury_agent::mercury::client",
            url = %url,
            bytes = code.len(),
            "sending code to playground"
        );
        let response = self
            .client
            .post(&url)
            .json(&CodeRequest { code })
            .send()
            .await
            .map_err(|e| self.transport_error("POST /api/code", e))?;
        Self::check_status("POST /api/code", response).await
    }

    /// Stop all sound.
    pub async fn silence(&self) -> Result<()> {
        let url = format!("{}/api/silence", self.base_url);
        tracing::debug!(target: "mercury_agent::mercury::client", url = %url, "silencing playground");
        let response = self
            .client
            .post(&url)
            .json(&SilenceRequest {})
            .send()
            .await
            .map_err(|e| self.transport_error("POST /api/silence", e))?;
        Self::check_status("POST /api/silence", response).await
    }

    /// Fetch the code the Playground is currently running, including edits
    /// made directly in the browser editor.
    pub async fn current_code(&self) -> Result<String> {
        let url = format!("{}/api/code", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error("GET /api/code", e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(AgentError::Playground(format!(
                "GET /api/code returned HTTP {}",
                status
            )));
        }

        let body: CodeResponse = response.json().await.map_err(|e| {
            AgentError::Playground(format!("GET /api/code returned an unreadable body: {}", e))
        })?;
        Ok(body.code.unwrap_or_default())
    }

    /// Whether the Playground answers its root page with 200.
    pub async fn health_check(&self) -> bool {
        match self.client.get(&self.base_url).send().await {
            Ok(response) => response.status().as_u16() == 200,
            Err(e) => {
                tracing::debug!(
                    target: "mercury_agent::mercury::client",
                    error = %e,
                    "playground health check failed"
                );
                false
            }
        }
    }

    fn transport_error(&self, operation: &str, err: reqwest::Error) -> AgentError {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection refused".to_string()
        } else {
            err.to_string()
        };
        AgentError::Playground(format!(
            "{} failed: cannot reach Mercury Playground at {} ({})",
            operation, self.base_url, reason
        ))
    }

    async fn check_status(operation: &str, response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        let detail = body.trim();
        Err(AgentError::Playground(if detail.is_empty() {
            format!("{} returned HTTP {}", operation, status.as_u16())
        } else {
            format!("{} returned HTTP {}: {}", operation, status.as_u16(), detail)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PlaygroundClient {
        PlaygroundClient::new(server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = PlaygroundClient::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_send_code_posts_code_verbatim() {
        let server = MockServer::start().await;
        let code = "set tempo 90\nnew synth saw name(pad)\n  \"quoted\" \\ trailing ";
        Mock::given(method("POST"))
            .and(path("/api/code"))
            .and(body_json(serde_json::json!({ "code": code })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).send_code(code).await.unwrap();
    }

    #[tokio::test]
    async fn test_silence_posts_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/silence"))
            .and(body_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).silence().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_code_non_success_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/code"))
            .respond_with(ResponseTemplate::new(500).set_body_string("engine crashed"))
            .mount(&server)
            .await;

        let err = client_for(&server).send_code("set tempo 90").await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("HTTP 500"), "{}", text);
        assert!(text.contains("engine crashed"), "{}", text);
    }

    #[tokio::test]
    async fn test_current_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/code"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": "set tempo 120"})),
            )
            .mount(&server)
            .await;

        assert_eq!(client_for(&server).current_code().await.unwrap(), "set tempo 120");
    }

    #[tokio::test]
    async fn test_current_code_missing_field_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        assert_eq!(client_for(&server).current_code().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_unreachable_playground() {
        // Port 9 (discard) is not expected to accept HTTP connections.
        let client = PlaygroundClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = client.send_code("set tempo 90").await.unwrap_err();
        assert!(matches!(err, AgentError::Playground(_)));
        assert!(err.to_string().contains("cannot reach Mercury Playground"));
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        assert!(client_for(&server).health_check().await);
    }
}
