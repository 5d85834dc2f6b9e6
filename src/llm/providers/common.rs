// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::{AgentError, ApiError};

/// Parse token counts from an arbitrary message by extracting the first numeric tokens.
pub(crate) fn parse_numeric_token_counts(message: &str) -> (u32, u32) {
    let numbers: Vec<u32> = message
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|s| s.parse().ok())
        .collect();

    match numbers.as_slice() {
        [current, limit, ..] => (*current, *limit),
        [single] => (*single, 0),
        _ => (0, 0),
    }
}

/// Parse numeric Retry-After header (seconds).
pub(crate) fn parse_retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
}

/// Construct a standardized server error.
pub(crate) fn server_error(status: u16, message: impl Into<String>) -> AgentError {
    AgentError::Api(ApiError::ServerError {
        status,
        message: message.into(),
    })
}

/// Line buffer for chunked HTTP bodies (SSE and NDJSON).
///
/// Bytes are held until a full line arrives so that multi-byte UTF-8
/// sequences split across chunks decode correctly.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every complete, non-empty, trimmed line.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the body ends without a trailing newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_token_counts() {
        assert_eq!(
            parse_numeric_token_counts("prompt is too long: 215300 tokens > 200000 maximum"),
            (215300, 200000)
        );
        assert_eq!(parse_numeric_token_counts("limit 42"), (42, 0));
        assert_eq!(parse_numeric_token_counts("nothing"), (0, 0));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after_seconds(&headers), None);
        headers.insert(RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(parse_retry_after_seconds(&headers), Some(30));
    }

    #[test]
    fn test_line_buffer_splits_across_chunks() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        let lines = buffer.push(b":1}\n\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "data: [DONE]"]);
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn test_line_buffer_keeps_utf8_intact() {
        let mut buffer = LineBuffer::default();
        let text = "é\n".as_bytes();
        assert!(buffer.push(&text[..1]).is_empty());
        assert_eq!(buffer.push(&text[1..]), vec!["é"]);
    }

    #[test]
    fn test_line_buffer_finish_returns_tail() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"{\"done\":true}");
        assert_eq!(buffer.finish().as_deref(), Some("{\"done\":true}"));
    }
}
