// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! CI runner registries.

pub mod github;
pub mod mock;
mod traits;

pub use github::{GithubConfig, GithubRegistry};
pub use mock::MockRegistry;
pub use traits::*;
