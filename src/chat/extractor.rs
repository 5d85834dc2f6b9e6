// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Code extraction fallback
//!
//! Used when the model cannot call tools, or answered with code in plain
//! text instead of calling `send_code`. Detection is keyword based only; the
//! code is never validated.

use regex::Regex;
use std::sync::LazyLock;

/// Any fenced block: ```<optional-lang>\n...\n```
static FENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\w*\s*\n(.*?)```").unwrap());

const MERCURY_MARKERS: [&str; 8] = [
    "set tempo",
    "new sample",
    "new synth",
    "new kokoro",
    "new poly",
    "new loop",
    "new noise",
    "silence",
];

pub fn looks_like_mercury(text: &str) -> bool {
    let lower = text.to_lowercase();
    MERCURY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Mercury code found in a model reply, or `None` for a conversational one.
///
/// The last fenced block that looks like Mercury wins. Fenced blocks that
/// don't look like Mercury are never sent. Without fences, the whole reply
/// counts if it looks like Mercury and spans at least two lines.
pub fn extract_code(response: &str) -> Option<String> {
    let blocks: Vec<&str> = FENCE_PATTERN
        .captures_iter(response)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    if !blocks.is_empty() {
        return blocks
            .iter()
            .rev()
            .map(|block| block.trim())
            .find(|code| looks_like_mercury(code))
            .map(str::to_string);
    }

    let stripped = response.trim();
    if looks_like_mercury(stripped) && stripped.lines().count() >= 2 {
        return Some(stripped.to_string());
    }

    None
}
