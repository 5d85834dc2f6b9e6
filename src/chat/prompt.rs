// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! System prompt construction
//!
//! The prompt is the composer preamble followed by the skill documents from
//! the skills directory, each trimmed to an equal share of the context
//! budget by dropping its least important sections.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use std::sync::LazyLock;

use crate::error::Result;

/// Skill documents, in prompt order
pub const SKILL_FILES: [&str; 4] = [
    "mercury-compose.md",
    "mercury-kokoro.md",
    "hydra-visuals.md",
    "hydra-reference.md",
];

const PART_SEPARATOR: &str = "\n\n---\n\n";

/// Section headings ordered from most to least important. Sections that
/// match nothing here are dropped first.
const SECTION_PRIORITY: [&str; 13] = [
    "Quick Reference",
    "Core Parameters",
    "Mercury Language Reference",
    "Global Settings",
    "Instruments",
    "Core Methods",
    "Effects",
    "Lists",
    "Hydra Visuals Integration",
    "Available Sounds",
    "Composition Tips",
    "Complete Examples",
    "Hydra Visual Recipes",
];

pub const PREAMBLE: &str = "\
You are a Mercury live-coding composer. You drive a running Mercury Playground \
by writing Mercury code.

RULES:
- Reply ONLY with Mercury code. Do not explain what you changed or why; no \
commentary, bullet points or summaries.
- When evolving an existing piece, make 3-4 targeted changes instead of \
rewriting it.
- If the `send_code` tool is available, call it to play code. Otherwise put the \
code in a ```mercury fenced block and it will be sent automatically.
- To stop all sound, call the `silence` tool or reply with the single word \
`silence` in a code block.
- Use `get_current_piece` when you need to see exactly what is playing.
- The Kokoro TTS voice instrument is available (`new kokoro`).
- Start every new piece with `set tempo <bpm>`.

MERCURY LIST SYNTAX: lists are ONE line, items separated by SPACES, never commas:
  CORRECT: list vis ['osc(8,0.1,1).color(0.3,0.5,0.9).out()' 'noise(3).color(0.2,0.1,0.3).out()']
  WRONG:   list vis [
             'osc(8,0.1,1).color(0.3,0.5,0.9).out()',
             'noise(3).color(0.2,0.1,0.3).out()'
           ]
Commas inside Hydra call arguments such as osc(8,0.1,1) are fine. Keep Hydra \
strings short (4-5 chained calls at most) and do not nest source functions \
inside modulate/blend arguments.
";

static FRONT_MATTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---\n.*?---\n").unwrap());

static SECTION_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{2,3}\s+").unwrap());

/// Builds the system prompt for a given context window
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    skills_dir: PathBuf,
    context_window: u32,
}

impl PromptBuilder {
    pub fn new(skills_dir: impl Into<PathBuf>, context_window: u32) -> Self {
        Self {
            skills_dir: skills_dir.into(),
            context_window,
        }
    }

    pub fn skill_paths(&self) -> Vec<PathBuf> {
        SKILL_FILES
            .iter()
            .map(|name| self.skills_dir.join(name))
            .collect()
    }

    /// Character budget for the whole prompt (~4 characters per token)
    fn budget_chars(&self) -> usize {
        self.context_window as usize * 4
    }

    /// 75% of the budget goes to the preamble and skills; the rest is left
    /// for conversation history.
    fn per_skill_budget(&self) -> usize {
        let skills = (self.budget_chars() * 3 / 4).saturating_sub(PREAMBLE.len());
        skills / SKILL_FILES.len()
    }

    pub fn build(&self) -> String {
        let per_skill = self.per_skill_budget();
        let mut parts = vec![PREAMBLE.to_string()];

        for path in self.skill_paths() {
            match fs::read_to_string(&path) {
                Ok(raw) => {
                    let body = FRONT_MATTER.replace(&raw, "");
                    parts.push(trim_skill(&body, per_skill).trim().to_string());
                }
                Err(e) => {
                    tracing::warn!(
                        target: "mercury_agent::chat::prompt",
                        path = %path.display(),
                        error = %e,
                        "skill file unavailable"
                    );
                    parts.push(format!("(Skill file not found: {})", path.display()));
                }
            }
        }

        let mut prompt = parts.join(PART_SEPARATOR);
        if prompt.len() / 4 > self.context_window as usize {
            prompt = prompt.chars().take(self.budget_chars()).collect();
        }

        tracing::debug!(
            target: "mercury_agent::chat::prompt",
            chars = prompt.len(),
            estimated_tokens = prompt.len() / 4,
            per_skill_budget = per_skill,
            "built system prompt"
        );
        prompt
    }
}

/// Write a generated prompt to disk for inspection
pub fn save_prompt(prompt: &str, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output, prompt)?;
    Ok(())
}

fn section_priority(heading: &str) -> usize {
    let heading = heading.to_lowercase();
    SECTION_PRIORITY
        .iter()
        .position(|keyword| heading.contains(&keyword.to_lowercase()))
        .unwrap_or(SECTION_PRIORITY.len() + 1)
}

/// Drop low-priority `##`/`###` sections until the text fits `budget`
/// characters. Kept sections stay in document order.
fn trim_skill(text: &str, budget: usize) -> String {
    if text.len() <= budget {
        return text.to_string();
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut sections: Vec<(String, usize, usize)> = Vec::new();
    let mut heading = String::new();
    let mut start = 0;
    for (i, line) in lines.iter().enumerate() {
        if SECTION_HEADING.is_match(line) {
            sections.push((heading, start, i));
            heading = line.trim_start_matches('#').trim().to_string();
            start = i;
        }
    }
    sections.push((heading, start, lines.len()));

    let mut ranked: Vec<(usize, usize, usize)> = sections
        .iter()
        .map(|(heading, start, end)| (section_priority(heading), *start, *end))
        .collect();
    ranked.sort_by_key(|(priority, _, _)| *priority);

    let mut used = 0;
    let mut kept: Vec<(usize, usize)> = Vec::new();
    for (_, start, end) in ranked {
        let size = lines[start..end].join("\n").len();
        if used + size <= budget {
            kept.push((start, end));
            used += size;
        }
    }
    kept.sort();

    kept.into_iter()
        .flat_map(|(start, end)| lines[start..end].iter().copied())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_skills(dir: &Path) {
        fs::write(
            dir.join("mercury-compose.md"),
            "---\nname: compose\n---\n# Compose\n## Quick Reference\nset tempo 90\n",
        )
        .unwrap();
        fs::write(dir.join("mercury-kokoro.md"), "## Instruments\nnew kokoro").unwrap();
        fs::write(dir.join("hydra-visuals.md"), "## Lists\nosc()").unwrap();
        fs::write(dir.join("hydra-reference.md"), "## Effects\nnoise()").unwrap();
    }

    #[test]
    fn test_build_includes_all_skills_in_order() {
        let temp_dir = TempDir::new().unwrap();
        write_skills(temp_dir.path());

        let prompt = PromptBuilder::new(temp_dir.path(), 8192).build();
        assert!(prompt.starts_with("You are a Mercury live-coding composer."));
        let parts: Vec<&str> = prompt.split(PART_SEPARATOR).collect();
        assert_eq!(parts.len(), 5);
        assert!(parts[1].starts_with("# Compose"));
        assert!(!parts[1].contains("name: compose"));
        assert_eq!(parts[2], "## Instruments\nnew kokoro");
        assert_eq!(parts[4], "## Effects\nnoise()");
    }

    #[test]
    fn test_missing_skill_file_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        let prompt = PromptBuilder::new(temp_dir.path(), 8192).build();
        let expected = format!(
            "(Skill file not found: {})",
            temp_dir.path().join("hydra-visuals.md").display()
        );
        assert!(prompt.contains(&expected));
    }

    #[test]
    fn test_trim_skill_drops_low_priority_sections() {
        let text = [
            "# Title",
            "## Complete Examples",
            "x".repeat(200).as_str(),
            "## Quick Reference",
            "set tempo 100",
            "## Unrelated Notes",
            "y".repeat(50).as_str(),
        ]
        .join("\n");

        let trimmed = trim_skill(&text, 120);
        assert!(trimmed.contains("## Quick Reference"));
        assert!(!trimmed.contains("## Complete Examples"));
        // Unranked sections and the untitled top go last but still fit here.
        assert!(trimmed.starts_with("# Title"));
        assert!(trimmed.contains("## Unrelated Notes"));
    }

    #[test]
    fn test_trim_skill_within_budget_untouched() {
        assert_eq!(trim_skill("## Lists\na b", 100), "## Lists\na b");
    }

    #[test]
    fn test_final_truncation_to_context() {
        let temp_dir = TempDir::new().unwrap();
        // A tiny context window forces the hard cut.
        let prompt = PromptBuilder::new(temp_dir.path(), 100).build();
        assert_eq!(prompt.chars().count(), 400);
    }

    #[test]
    fn test_section_priority() {
        assert_eq!(section_priority("Quick Reference"), 0);
        assert_eq!(section_priority("Hydra Visual Recipes (advanced)"), 12);
        assert_eq!(section_priority("Misc"), SECTION_PRIORITY.len() + 1);
    }

    #[test]
    fn test_save_prompt_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("out").join("prompt.md");
        save_prompt("hello", &output).unwrap();
        assert_eq!(fs::read_to_string(output).unwrap(), "hello");
    }
}
