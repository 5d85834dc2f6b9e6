// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Plain-text mirror of the last piece sent to the Playground

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File-backed record of what is currently playing.
#[derive(Debug, Clone)]
pub struct PieceState {
    path: PathBuf,
}

impl PieceState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current piece, trimmed. A missing file reads as empty.
    pub fn read(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.trim().to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Like [`read`](Self::read), but logs and swallows IO failures.
    pub fn read_or_empty(&self) -> String {
        self.read().unwrap_or_else(|e| {
            tracing::warn!(
                target: "mercury_agent::mercury::state",
                path = %self.path.display(),
                error = %e,
                "failed to read piece state"
            );
            String::new()
        })
    }

    /// Persist the piece with a trailing newline.
    pub fn write(&self, code: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, format!("{}\n", code))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, "")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let state = PieceState::new(temp_dir.path().join("current_piece.txt"));
        assert_eq!(state.read().unwrap(), "");
    }

    #[test]
    fn test_write_then_read_trims() {
        let temp_dir = TempDir::new().unwrap();
        let state = PieceState::new(temp_dir.path().join("nested/dir/current_piece.txt"));

        state.write("set tempo 90\nnew synth saw").unwrap();
        let raw = std::fs::read_to_string(state.path()).unwrap();
        assert_eq!(raw, "set tempo 90\nnew synth saw\n");
        assert_eq!(state.read().unwrap(), "set tempo 90\nnew synth saw");
    }

    #[test]
    fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let state = PieceState::new(temp_dir.path().join("current_piece.txt"));
        state.write("set tempo 90").unwrap();
        state.clear().unwrap();
        assert_eq!(state.read().unwrap(), "");
        assert!(state.path().exists());
    }

    #[test]
    fn test_read_or_empty_on_directory() {
        let temp_dir = TempDir::new().unwrap();
        // Reading a directory fails with an IO error other than NotFound.
        let state = PieceState::new(temp_dir.path());
        assert!(state.read().is_err());
        assert_eq!(state.read_or_empty(), "");
    }
}
