// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mercury Playground integration
//!
//! The Playground server owns the piece that is currently playing. This
//! module talks to its HTTP API ([`client`]), mirrors the last piece to a
//! plain-text file ([`state`]), and keeps a time-stamped cached copy that the
//! chat session reads before each turn ([`sync`]).

pub mod client;
pub mod piece;
pub mod state;
pub mod sync;

pub use client::PlaygroundClient;
pub use piece::{CurrentPiece, PieceSource, PieceView};
pub use state::PieceState;
pub use sync::{PlaygroundSync, PollHandle};
