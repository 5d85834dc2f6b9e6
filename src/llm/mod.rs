// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module
//!
//! Provides abstraction over the supported LLM providers.

pub mod factory;
pub mod message;
pub mod mock_provider;
pub mod provider;
pub mod providers;
pub mod retry;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use message::*;
pub use provider::*;
