// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Removing runner registrations of an instance.
//!
//! The start phase never learns registry ids, so runners are found by the
//! instance id label every runner carries.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::Result;
use crate::registry::{RunnerDescriptor, RunnerRegistry};

/// Finds and deletes the runners of an instance.
pub struct RunnerReconciler {
    registry: Arc<dyn RunnerRegistry>,
}

impl RunnerReconciler {
    /// Create a reconciler.
    pub fn new(registry: Arc<dyn RunnerRegistry>) -> Self {
        Self { registry }
    }

    /// Runners labelled with the instance id.
    pub async fn find_runners(&self, instance_id: &str) -> Result<Vec<RunnerDescriptor>> {
        let runners = self.registry.list_runners().await?;
        Ok(runners
            .into_iter()
            .filter(|r| r.has_label(instance_id))
            .collect())
    }

    /// Delete every runner of the instance; returns the deleted runners.
    ///
    /// Finding none is not an error. The first failed deletion aborts.
    #[instrument(skip(self))]
    pub async fn remove_runners(&self, instance_id: &str) -> Result<Vec<RunnerDescriptor>> {
        let runners = self.find_runners(instance_id).await?;
        if runners.is_empty() {
            info!("No runners registered for instance, skipping removal");
            return Ok(runners);
        }

        for runner in &runners {
            self.registry.delete_runner(runner.id).await?;
            info!(runner = %runner.name, runner_id = runner.id, "Runner removed");
        }
        Ok(runners)
    }
}
