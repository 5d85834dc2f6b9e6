// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for the Mercury agent
//!
//! This module defines all error types used throughout the application.

use thiserror::Error;

/// Main error type for agent operations
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Tool execution errors
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mercury Playground request failed
    #[error("Playground error: {0}")]
    Playground(String),

    /// Session / turn-state violations
    #[error("Session error: {0}")]
    Session(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Context window exceeded
    #[error("Context too long: {current} tokens exceeds limit of {limit}")]
    ContextTooLong { current: u32, limit: u32 },

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Whether the error should stop the process at startup rather than
    /// being reported inside the conversation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AgentError::Config(_) | AgentError::Api(ApiError::AuthenticationFailed(_))
        )
    }
}

/// Map a reqwest transport failure into the API taxonomy.
///
/// Connection and timeout failures are transient; everything else is reported
/// as a generic HTTP error.
pub fn classify_transport_error(err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        AgentError::Api(ApiError::Timeout)
    } else if err.is_connect() || err.is_request() {
        AgentError::Api(ApiError::Network(err.to_string()))
    } else {
        AgentError::Http(err)
    }
}
