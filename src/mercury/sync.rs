// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Playground sync
//!
//! Every model turn starts with a pull from `GET /api/code`, so edits made in
//! the browser editor are visible to the model. An optional background poller
//! refreshes the same cache on an interval and pushes changes to in-process
//! subscribers through a `watch` channel. When the Playground is unreachable
//! the last-known copy is served and marked stale.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::client::PlaygroundClient;
use super::piece::{CurrentPiece, PieceSource, PieceView};
use super::state::PieceState;

/// Shared handle to the cached current piece.
#[derive(Debug, Clone)]
pub struct PlaygroundSync {
    client: PlaygroundClient,
    state: PieceState,
    cache: Arc<watch::Sender<Option<CurrentPiece>>>,
}

/// Background poller; stops when dropped.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl PlaygroundSync {
    pub fn new(client: PlaygroundClient, state: PieceState) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            client,
            state,
            cache: Arc::new(sender),
        }
    }

    pub fn client(&self) -> &PlaygroundClient {
        &self.client
    }

    pub fn state(&self) -> &PieceState {
        &self.state
    }

    /// Last cached piece without touching the network
    pub fn snapshot(&self) -> Option<CurrentPiece> {
        self.cache.borrow().clone()
    }

    /// Receive a notification whenever the cached piece changes
    pub fn subscribe(&self) -> watch::Receiver<Option<CurrentPiece>> {
        self.cache.subscribe()
    }

    /// Pull the current piece from the Playground.
    ///
    /// A live, non-empty piece refreshes the cache and the state file. An
    /// empty live piece falls back to the state file. An unreachable
    /// Playground yields the last-known copy with `stale` set.
    pub async fn refresh(&self) -> PieceView {
        match self.client.current_code().await {
            Ok(code) => {
                let code = code.trim();
                if !code.is_empty() {
                    if let Err(e) = self.state.write(code) {
                        tracing::warn!(
                            target: "mercury_agent::mercury::sync",
                            error = %e,
                            "failed to mirror live piece to state file"
                        );
                    }
                    let piece = self.store(CurrentPiece::new(code, PieceSource::Live));
                    return PieceView {
                        piece: Some(piece),
                        stale: false,
                        warning: None,
                    };
                }

                let piece = self.from_state_file();
                self.cache.send_if_modified(|cached| replace_if_changed(cached, piece.clone()));
                PieceView {
                    piece,
                    stale: false,
                    warning: None,
                }
            }
            Err(e) => {
                let last_known = self.snapshot().or_else(|| self.from_state_file());
                let warning = match &last_known {
                    Some(piece) => format!(
                        "Mercury Playground unreachable; using last-known piece from {} ({})",
                        piece.fetched_at.format("%H:%M:%S"),
                        e
                    ),
                    None => format!("Mercury Playground unreachable ({})", e),
                };
                tracing::warn!(
                    target: "mercury_agent::mercury::sync",
                    error = %e,
                    has_fallback = last_known.is_some(),
                    "playground sync failed"
                );
                PieceView {
                    piece: last_known,
                    stale: true,
                    warning: Some(warning),
                }
            }
        }
    }

    /// Record code the agent just sent to the Playground.
    pub fn record_sent(&self, code: &str) {
        self.store(CurrentPiece::new(code, PieceSource::Live));
    }

    /// Record that the Playground was silenced.
    pub fn record_silenced(&self) {
        self.cache.send_if_modified(|cached| replace_if_changed(cached, None));
    }

    /// Start polling the Playground every `interval`.
    pub fn spawn_polling(&self, interval: Duration) -> PollHandle {
        let sync = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let view = sync.refresh().await;
                tracing::trace!(
                    target: "mercury_agent::mercury::sync",
                    stale = view.stale,
                    lines = view.piece.as_ref().map(|p| p.line_count()).unwrap_or(0),
                    "polled playground"
                );
            }
        });
        PollHandle { task }
    }

    fn store(&self, piece: CurrentPiece) -> CurrentPiece {
        let stored = piece.clone();
        self.cache
            .send_if_modified(|cached| replace_if_changed(cached, Some(piece)));
        stored
    }

    fn from_state_file(&self) -> Option<CurrentPiece> {
        let code = self.state.read_or_empty();
        if code.is_empty() {
            None
        } else {
            Some(CurrentPiece::new(code, PieceSource::StateFile))
        }
    }
}

/// Replace the cached piece and report whether the code changed. The
/// timestamp is refreshed either way.
fn replace_if_changed(cached: &mut Option<CurrentPiece>, next: Option<CurrentPiece>) -> bool {
    let changed = cached.as_ref().map(|p| &p.code) != next.as_ref().map(|p| &p.code);
    *cached = next;
    changed
}
