// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-turn response metrics

use std::time::Duration;

use serde_json::{json, Value};

use crate::llm::provider::{Timings, Usage};

/// Token counts and timings for one model response (or a whole turn, when
/// several rounds are folded together with [`ResponseMetrics::absorb`]).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResponseMetrics {
    pub prompt_tokens: u32,
    pub generated_tokens: u32,
    pub cache_read_tokens: u32,
    pub cache_creation_tokens: u32,
    pub prompt_eval_ms: f64,
    pub eval_ms: f64,
    pub total_ms: f64,
    pub load_ms: f64,
}

impl ResponseMetrics {
    /// Build metrics from provider usage. When the provider reports no total
    /// time, the measured wall-clock time is used.
    pub fn from_response(usage: &Usage, timings: Option<&Timings>, wall: Duration) -> Self {
        let timings = timings.copied().unwrap_or_default();
        let total_ms = if timings.total_ms > 0.0 {
            timings.total_ms
        } else {
            wall.as_secs_f64() * 1000.0
        };

        Self {
            prompt_tokens: usage.input_tokens,
            generated_tokens: usage.output_tokens,
            cache_read_tokens: usage.cache_read_input_tokens,
            cache_creation_tokens: usage.cache_creation_input_tokens,
            prompt_eval_ms: timings.prompt_eval_ms,
            eval_ms: timings.eval_ms,
            total_ms,
            load_ms: timings.load_ms,
        }
    }

    /// Fold another round of the same turn into this one
    pub fn absorb(&mut self, other: &ResponseMetrics) {
        self.prompt_tokens += other.prompt_tokens;
        self.generated_tokens += other.generated_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
        self.prompt_eval_ms += other.prompt_eval_ms;
        self.eval_ms += other.eval_ms;
        self.total_ms += other.total_ms;
        self.load_ms += other.load_ms;
    }

    pub fn prompt_tok_per_sec(&self) -> f64 {
        rate(self.prompt_tokens, self.prompt_eval_ms)
    }

    pub fn gen_tok_per_sec(&self) -> f64 {
        rate(self.generated_tokens, self.eval_ms)
    }

    /// One-line summary, e.g.
    /// `prompt: 812 tok @ 950.2 t/s · gen: 64 tok @ 41.3 t/s · total: 2.4s`
    pub fn format_compact(&self) -> String {
        let mut parts = Vec::new();

        if self.prompt_tokens > 0 {
            let mut prompt = format!("prompt: {} tok", self.prompt_tokens);
            let speed = self.prompt_tok_per_sec();
            if speed > 0.0 {
                prompt.push_str(&format!(" @ {:.1} t/s", speed));
            }
            parts.push(prompt);
        }
        if self.cache_read_tokens > 0 {
            parts.push(format!("cached: {} tok", self.cache_read_tokens));
        }
        if self.generated_tokens > 0 {
            parts.push(format!(
                "gen: {} tok @ {:.1} t/s",
                self.generated_tokens,
                self.gen_tok_per_sec()
            ));
        }
        if self.total_ms > 0.0 {
            parts.push(format!("total: {:.1}s", self.total_ms / 1000.0));
        }

        if parts.is_empty() {
            "no metrics".to_string()
        } else {
            parts.join(" · ")
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "prompt_tokens": self.prompt_tokens,
            "generated_tokens": self.generated_tokens,
            "prompt_tok_per_sec": round1(self.prompt_tok_per_sec()),
            "gen_tok_per_sec": round1(self.gen_tok_per_sec()),
            "total_ms": self.total_ms.round() as u64,
            "load_ms": self.load_ms.round() as u64,
            "cache_read_tokens": self.cache_read_tokens,
            "cache_creation_tokens": self.cache_creation_tokens,
        })
    }
}

fn rate(tokens: u32, ms: f64) -> f64 {
    if ms <= 0.0 {
        0.0
    } else {
        tokens as f64 / (ms / 1000.0)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
