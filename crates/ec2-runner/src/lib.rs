// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! ec2-runner - Ephemeral EC2 Instances as Self-Hosted Runners
//!
//! This crate provisions EC2 instances that register themselves as GitHub
//! Actions self-hosted runners, and releases them when the job is done. It
//! runs as two independent invocations, `start` and `stop`, that share no
//! local state: the instance id, instance tags and runner labels are the
//! only correlation between them.
//!
//! # Architecture
//!
//! ```text
//!  start                                         stop
//!  ─────                                         ────
//!  ┌──────────────────┐                          ┌──────────────────────┐
//!  │ CapacityAcquirer │ reuse / spot / on-demand │  RunnerReconciler    │ delete by
//!  └────────┬─────────┘ subnet fallback          └──────────┬───────────┘ instance label
//!           ▼                                               ▼
//!  ┌──────────────────┐                          ┌──────────────────────┐
//!  │ ReadinessWaiter  │ provider waiter, 5 min   │ LifecycleTerminator  │ stop or
//!  └────────┬─────────┘                          └──────────────────────┘ terminate
//!           ▼
//!  ┌────────────────────┐
//!  │ RegistrationPoller │ 30 s quiet, 10 s ticks, 5 min
//!  └────────────────────┘
//!
//!  ComputeProvider (EC2)                  RunnerRegistry (GitHub REST)
//! ```
//!
//! # Components
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | [`CapacityAcquirer`](acquire::CapacityAcquirer) | `acquire` | Reuse a stopped instance or create one through the fallback ladder |
//! | [`LifecycleTerminator`](terminate::LifecycleTerminator) | `terminate` | Stop or terminate, cancelling spot requests |
//! | [`ReadinessWaiter`](readiness::ReadinessWaiter) | `readiness` | Bounded wait for `running` |
//! | [`RegistrationPoller`](registration::RegistrationPoller) | `registration` | Bounded wait for runners to be online |
//! | [`RunnerReconciler`](reconcile::RunnerReconciler) | `reconcile` | Delete runner registrations by instance label |
//!
//! # Error Handling
//!
//! Provider failures are classified into
//! [`ProviderErrorKind`](provider::ProviderErrorKind) by the EC2 adapter.
//! Capacity, spot-state, unsupported-operation and not-found conditions are
//! handled where they occur; everything else propagates as [`Error`].

#![deny(missing_docs)]

pub mod acquire;
pub mod config;
pub mod error;
pub mod outputs;
pub mod provider;
pub mod readiness;
pub mod reconcile;
pub mod registration;
pub mod registry;
pub mod runners;
pub mod terminate;
pub mod user_data;
pub mod workflow;

pub use error::{Error, Result};
pub use workflow::{StartOutcome, StopOutcome, Workflow};
