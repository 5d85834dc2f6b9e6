// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Cached view of the Playground's current piece

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a cached piece came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PieceSource {
    /// Fetched from (or just sent to) the Playground
    Live,
    /// Read from the local state file
    StateFile,
}

/// A time-stamped copy of the Playground's piece. The Playground owns the
/// truth; this is only what the agent last saw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentPiece {
    pub code: String,
    pub fetched_at: DateTime<Utc>,
    pub source: PieceSource,
}

impl CurrentPiece {
    pub fn new(code: impl Into<String>, source: PieceSource) -> Self {
        Self {
            code: code.into(),
            fetched_at: Utc::now(),
            source,
        }
    }

    pub fn line_count(&self) -> usize {
        self.code.lines().count()
    }

    /// System context block describing what is playing
    pub fn as_context(&self) -> String {
        format!("Currently playing piece:\n```\n{}\n```", self.code)
    }
}

/// Result of a sync attempt
#[derive(Debug, Clone, Default)]
pub struct PieceView {
    /// Best-known piece, if any
    pub piece: Option<CurrentPiece>,
    /// True when the Playground could not be reached and `piece` is the
    /// last-known copy
    pub stale: bool,
    /// Human-readable description of why the view is stale
    pub warning: Option<String>,
}

impl PieceView {
    pub fn code(&self) -> Option<&str> {
        self.piece.as_ref().map(|p| p.code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_count() {
        let piece = CurrentPiece::new("set tempo 90\nnew synth saw", PieceSource::Live);
        assert_eq!(piece.line_count(), 2);
    }

    #[test]
    fn test_as_context() {
        let piece = CurrentPiece::new("set tempo 90", PieceSource::StateFile);
        assert_eq!(
            piece.as_context(),
            "Currently playing piece:\n```\nset tempo 90\n```"
        );
    }

    #[test]
    fn test_view_code() {
        let view = PieceView::default();
        assert!(view.code().is_none());
        assert!(!view.stale);
    }
}
