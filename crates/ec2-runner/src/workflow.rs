// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Start and stop phases.
//!
//! The two phases run as separate processes and share nothing but the
//! instance id and the labels/tags persisted in the provider and registry.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::acquire::{Acquisition, CapacityAcquirer};
use crate::config::{GithubSettings, StartConfig, StopConfig};
use crate::error::Result;
use crate::outputs::{INSTANCE_ID_OUTPUT, OutputSink, RUNNERS_OUTPUT};
use crate::provider::ComputeProvider;
use crate::readiness::{ReadinessConfig, ReadinessWaiter};
use crate::reconcile::RunnerReconciler;
use crate::registration::{RegistrationPoller, RegistrationPollerConfig};
use crate::registry::{RunnerDescriptor, RunnerRegistry};
use crate::terminate::{LifecycleTerminator, TerminationOutcome};
use crate::user_data::{self, UserDataParams};

/// Result of the start phase.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    /// Acquired instance.
    pub instance_id: String,
    /// Runner names, all online.
    pub runners: Vec<String>,
    /// Whether a stopped instance was reused.
    pub reused: bool,
}

/// Result of the stop phase.
#[derive(Debug, Clone)]
pub struct StopOutcome {
    /// Runners whose registrations were deleted.
    pub removed_runners: Vec<RunnerDescriptor>,
    /// What happened to the instance.
    pub instance: TerminationOutcome,
}

/// Orchestrates both phases over a provider, a registry and an output sink.
pub struct Workflow {
    provider: Arc<dyn ComputeProvider>,
    registry: Arc<dyn RunnerRegistry>,
    outputs: Arc<dyn OutputSink>,
    readiness: ReadinessConfig,
    registration: RegistrationPollerConfig,
    seed: Option<u64>,
}

impl Workflow {
    /// Create a workflow with default timings.
    pub fn new(
        provider: Arc<dyn ComputeProvider>,
        registry: Arc<dyn RunnerRegistry>,
        outputs: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            provider,
            registry,
            outputs,
            readiness: ReadinessConfig::default(),
            registration: RegistrationPollerConfig::default(),
            seed: None,
        }
    }

    /// Override the running-wait settings.
    pub fn with_readiness(mut self, config: ReadinessConfig) -> Self {
        self.readiness = config;
        self
    }

    /// Override the registration poll settings.
    pub fn with_registration(mut self, config: RegistrationPollerConfig) -> Self {
        self.registration = config;
        self
    }

    /// Seed the subnet shuffle.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Acquire an instance, publish its id, and wait for its runners.
    pub async fn start(&self, github: &GithubSettings, config: &StartConfig) -> Result<StartOutcome> {
        let registration_token = self.registry.registration_token().await?;
        let payload = user_data::build(&UserDataParams {
            registration_token,
            runner_count: config.runner_count,
            labels: config.runner_labels(),
            server_url: github.server_url.clone(),
            owner: github.owner.clone(),
            repo: github.repo.clone(),
            runner_version: config.runner_version.clone(),
            runner_home_dir: config.runner_home_dir.clone(),
        });
        let request = config.provisioning_request(payload);

        let mut acquirer = CapacityAcquirer::new(self.provider.clone());
        if let Some(seed) = self.seed {
            acquirer = acquirer.with_seed(seed);
        }
        let acquisition = acquirer.acquire(&request).await?;
        let instance_id = acquisition.instance.instance_id.clone();

        self.outputs
            .set_output(INSTANCE_ID_OUTPUT, &instance_id)?;
        self.outputs
            .set_output(RUNNERS_OUTPUT, &acquisition.runner_set.runners_json()?)?;
        info!(instance_id = %instance_id, reused = acquisition.reused, "Instance acquired");

        match self.await_runners(&acquisition).await {
            Ok(()) => Ok(StartOutcome {
                instance_id,
                runners: acquisition.runner_set.runners,
                reused: acquisition.reused,
            }),
            Err(e) => {
                if config.cleanup_on_failure {
                    warn!(instance_id = %instance_id, error = %e, "Start failed, releasing instance");
                    let stop = StopConfig {
                        instance_id: instance_id.clone(),
                        reuse: config.reuse,
                    };
                    if let Err(cleanup) = self.stop(&stop).await {
                        error!(instance_id = %instance_id, error = %cleanup, "Cleanup failed");
                    }
                }
                Err(e)
            }
        }
    }

    async fn await_runners(&self, acquisition: &Acquisition) -> Result<()> {
        ReadinessWaiter::new(self.provider.clone(), self.readiness.clone())
            .wait(&acquisition.instance.instance_id)
            .await?;
        RegistrationPoller::new(self.registry.clone(), self.registration.clone())
            .wait(&acquisition.runner_set)
            .await?;
        Ok(())
    }

    /// Remove the instance's runners, then stop or terminate it.
    ///
    /// The instance is released even when runner removal fails; the removal
    /// error is returned afterwards.
    pub async fn stop(&self, config: &StopConfig) -> Result<StopOutcome> {
        let removed = RunnerReconciler::new(self.registry.clone())
            .remove_runners(&config.instance_id)
            .await;
        if let Err(e) = &removed {
            warn!(instance_id = %config.instance_id, error = %e, "Runner removal failed, releasing instance anyway");
        }

        let released = LifecycleTerminator::new(self.provider.clone())
            .release(&config.instance_id, config.reuse)
            .await;

        let (removed_runners, instance) = match (removed, released) {
            (Ok(removed_runners), Ok(instance)) => (removed_runners, instance),
            (Err(e), Ok(instance)) => {
                info!(instance_id = %config.instance_id, outcome = %instance, "Instance released");
                return Err(e);
            }
            (Err(e), Err(release)) => {
                error!(instance_id = %config.instance_id, error = %release, "Instance release failed");
                return Err(e);
            }
            (Ok(_), Err(e)) => return Err(e),
        };

        info!(
            instance_id = %config.instance_id,
            removed = removed_runners.len(),
            outcome = %instance,
            "Instance released"
        );
        Ok(StopOutcome {
            removed_runners,
            instance,
        })
    }
}
