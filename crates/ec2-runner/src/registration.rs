// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Waiting for runners to come online in the registry.
//!
//! There is no signal from the instance when its agents have registered, so
//! the registry is polled: a quiet period first (the agents need time to
//! boot), then one listing per interval until every expected runner is
//! online or the budget, counted from the first tick, is spent.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::registry::{RunnerDescriptor, RunnerRegistry};
use crate::runners::RunnerSetInfo;

/// Registration poll settings.
#[derive(Debug, Clone)]
pub struct RegistrationPollerConfig {
    /// Delay before the first listing.
    pub quiet_period: Duration,
    /// Delay between listings.
    pub poll_interval: Duration,
    /// Budget counted from the start of the poll loop.
    pub timeout: Duration,
}

impl Default for RegistrationPollerConfig {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_secs(30),
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Polls the registry until a runner set is online.
pub struct RegistrationPoller {
    registry: Arc<dyn RunnerRegistry>,
    config: RegistrationPollerConfig,
}

impl RegistrationPoller {
    /// Create a poller.
    pub fn new(registry: Arc<dyn RunnerRegistry>, config: RegistrationPollerConfig) -> Self {
        Self { registry, config }
    }

    /// Wait until every runner of the set is online; returns those runners.
    pub async fn wait(&self, runner_set: &RunnerSetInfo) -> Result<Vec<RunnerDescriptor>> {
        let instance_id = runner_set.instance_id.as_str();
        let expected = runner_set.expected();

        info!(
            instance_id,
            quiet_period_secs = self.config.quiet_period.as_secs(),
            "Waiting for runners to register"
        );
        sleep(self.config.quiet_period).await;

        info!(
            instance_id,
            interval_secs = self.config.poll_interval.as_secs(),
            "Checking runner registration"
        );
        let started = Instant::now();
        let mut next_tick = started + self.config.poll_interval;
        let mut ready = 0;

        loop {
            sleep_until(next_tick).await;

            let elapsed = started.elapsed();
            if elapsed > self.config.timeout {
                error!(instance_id, ready, expected, "Runner registration timed out");
                return Err(Error::RegistrationTimeout {
                    instance_id: instance_id.to_string(),
                    waited: self.config.timeout,
                    ready,
                    expected,
                });
            }

            match self.registry.list_runners().await {
                Ok(runners) => {
                    let found: Vec<&RunnerDescriptor> = runners
                        .iter()
                        .filter(|r| runner_set.contains(&r.name))
                        .collect();
                    let online: Vec<RunnerDescriptor> = found
                        .iter()
                        .filter(|r| r.is_online())
                        .map(|r| (*r).clone())
                        .collect();
                    ready = online.len();

                    info!(
                        instance_id,
                        found = ?found.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
                        ready = ?online.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
                        expected,
                        elapsed_secs = elapsed.as_secs(),
                        "Registration check"
                    );

                    if ready >= expected {
                        for runner in &online {
                            info!(instance_id, runner = %runner.name, "Runner is registered and online");
                        }
                        return Ok(online);
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(instance_id, error = %e, "Registry unavailable, will retry");
                    ready = 0;
                }
                Err(e) => return Err(e.into()),
            }

            next_tick += self.config.poll_interval;
        }
    }
}
