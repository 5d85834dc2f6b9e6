// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Browser shell
//!
//! An axum server exposing a JSON API and a `/ws` WebSocket over the shared
//! [`ChatEngine`](crate::chat::ChatEngine), plus the embedded chat page.

pub mod server;
pub mod ws;

pub use server::{router, serve, AppState};
