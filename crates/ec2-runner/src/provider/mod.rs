// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute providers.
//!
//! [`ComputeProvider`] is the seam between lifecycle logic and the cloud.
//! [`Ec2Provider`] talks to EC2; [`MockProvider`] keeps state in memory for
//! tests.

pub mod ec2;
pub mod mock;
mod traits;

pub use ec2::Ec2Provider;
pub use mock::{MockProvider, ProviderCall};
pub use traits::*;
