// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Capacity acquisition.
//!
//! Produces one started instance for a [`ProvisioningRequest`]:
//!
//! 1. With reuse enabled, look for a stopped instance matching the tags,
//!    instance type and image, and start it with the fresh boot payload.
//!    A capacity or spot-state failure on start falls back to creating a new
//!    on-demand instance.
//! 2. Otherwise create: subnets (shuffled) are the outer loop, markets
//!    (spot, then on-demand) the inner loop. A capacity failure advances to
//!    the next attempt; any other failure aborts the whole acquisition.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::provider::{
    ComputeProvider, InstanceHandle, LaunchAttempt, MarketType, ProviderError, ProviderErrorKind,
    ProvisioningRequest, ReuseFilter,
};
use crate::runners::RunnerSetInfo;

/// Result of a successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    /// The started instance.
    pub instance: InstanceHandle,
    /// Runner names the instance will register.
    pub runner_set: RunnerSetInfo,
    /// Whether a stopped instance was started instead of creating one.
    pub reused: bool,
}

/// Markets to try for a preference, in order.
pub fn market_ladder(preference: MarketType) -> Vec<MarketType> {
    match preference {
        MarketType::Spot => vec![MarketType::Spot, MarketType::OnDemand],
        MarketType::OnDemand => vec![MarketType::OnDemand],
    }
}

/// Launch attempts for the given subnet order and markets.
///
/// Without subnets a single provider-default placement is used.
pub fn launch_plan(subnets: &[String], markets: &[MarketType]) -> Vec<LaunchAttempt> {
    let placements: Vec<Option<String>> = if subnets.is_empty() {
        vec![None]
    } else {
        subnets.iter().cloned().map(Some).collect()
    };

    placements
        .into_iter()
        .flat_map(|subnet_id| {
            markets.iter().map(move |market| LaunchAttempt {
                subnet_id: subnet_id.clone(),
                market: *market,
            })
        })
        .collect()
}

fn acquired(instance: InstanceHandle, request: &ProvisioningRequest, reused: bool) -> Acquisition {
    let runner_set = RunnerSetInfo::derive(&instance.instance_id, request.runner_count);
    Acquisition {
        instance,
        runner_set,
        reused,
    }
}

/// Acquires capacity from a [`ComputeProvider`].
pub struct CapacityAcquirer {
    provider: Arc<dyn ComputeProvider>,
    rng: StdRng,
}

impl CapacityAcquirer {
    /// Create an acquirer with a randomly seeded subnet shuffle.
    pub fn new(provider: Arc<dyn ComputeProvider>) -> Self {
        Self {
            provider,
            rng: StdRng::from_entropy(),
        }
    }

    /// Seed the subnet shuffle.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Acquire one instance for the request.
    pub async fn acquire(&mut self, request: &ProvisioningRequest) -> Result<Acquisition> {
        let mut markets = market_ladder(request.market);

        if request.reuse {
            let filter = ReuseFilter::from(request);
            match self.provider.find_stopped_instance(&filter).await? {
                Some(instance) => {
                    info!(instance_id = %instance.instance_id, "Starting stopped instance");
                    match self
                        .provider
                        .start(&instance.instance_id, &request.user_data)
                        .await
                    {
                        Ok(()) => return Ok(acquired(instance, request, true)),
                        Err(e)
                            if e.is(ProviderErrorKind::CapacityUnavailable)
                                || e.is(ProviderErrorKind::SpotStateConflict) =>
                        {
                            warn!(
                                instance_id = %instance.instance_id,
                                error = %e,
                                "Could not start stopped instance, creating an on-demand instance"
                            );
                            markets = vec![MarketType::OnDemand];
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                None => info!("No stopped instance to reuse, creating a new one"),
            }
        }

        let instance = self.create(request, &markets).await?;
        Ok(acquired(instance, request, false))
    }

    async fn create(
        &mut self,
        request: &ProvisioningRequest,
        markets: &[MarketType],
    ) -> Result<InstanceHandle> {
        let mut subnets = request.subnet_ids.clone();
        if subnets.len() > 1 {
            subnets.shuffle(&mut self.rng);
        }

        let plan = launch_plan(&subnets, markets);
        let mut last: Option<ProviderError> = None;

        for (n, attempt) in plan.iter().enumerate() {
            info!(
                attempt = n + 1,
                of = plan.len(),
                subnet_id = attempt.subnet_id.as_deref().unwrap_or("default"),
                market = %attempt.market,
                "Launching instance"
            );
            match self.provider.launch(request, attempt).await {
                Ok(instance) => {
                    info!(instance_id = %instance.instance_id, market = %attempt.market, "Instance launched");
                    return Ok(instance);
                }
                Err(e) if e.is(ProviderErrorKind::CapacityUnavailable) => {
                    warn!(error = %e, market = %attempt.market, "No capacity, trying next option");
                    last = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Acquisition {
            attempts: plan.len(),
            last: last.unwrap_or_else(|| ProviderError::other("no launch attempts planned")),
        })
    }
}
