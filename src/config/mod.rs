// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Configuration module
//!
//! Settings are layered: built-in defaults, an optional settings file,
//! environment variables, then command-line overrides.

pub mod settings;

pub use settings::*;
