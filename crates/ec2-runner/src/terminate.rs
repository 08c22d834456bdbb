// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Releasing acquired instances.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::provider::{ComputeProvider, InstanceStatus, ProviderErrorKind};

/// What the terminator did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// Instance stopped; volumes and a persistent spot request are kept.
    Stopped,
    /// Instance terminated.
    Terminated,
    /// Instance was already stopped or stopping.
    AlreadyStopped,
    /// Instance was already terminated or shutting down.
    AlreadyTerminated,
    /// No such instance.
    NotFound,
}

impl fmt::Display for TerminationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationOutcome::Stopped => "stopped",
            TerminationOutcome::Terminated => "terminated",
            TerminationOutcome::AlreadyStopped => "already stopped",
            TerminationOutcome::AlreadyTerminated => "already terminated",
            TerminationOutcome::NotFound => "not found",
        };
        f.write_str(s)
    }
}

/// Reverses what the capacity acquirer did.
///
/// In reuse mode the instance is stopped so it can be started again; if the
/// provider does not support stopping it, the instance is terminated
/// instead. Every destructive path cancels the spot request first. Calling
/// it on an instance that is already gone (or, in reuse mode, already
/// stopped) succeeds without side effects on the instance.
pub struct LifecycleTerminator {
    provider: Arc<dyn ComputeProvider>,
}

impl LifecycleTerminator {
    /// Create a terminator.
    pub fn new(provider: Arc<dyn ComputeProvider>) -> Self {
        Self { provider }
    }

    /// Release an instance.
    pub async fn release(&self, instance_id: &str, reuse: bool) -> Result<TerminationOutcome> {
        let Some(description) = self.provider.describe(instance_id).await? else {
            info!(instance_id, "Instance not found, nothing to release");
            return Ok(TerminationOutcome::NotFound);
        };
        let spot_request_id = description.spot_request_id.as_deref();

        match description.status {
            InstanceStatus::Terminated | InstanceStatus::ShuttingDown => {
                self.cancel_spot_request(instance_id, spot_request_id)
                    .await?;
                info!(instance_id, status = %description.status, "Instance already terminated");
                return Ok(TerminationOutcome::AlreadyTerminated);
            }
            InstanceStatus::Stopped | InstanceStatus::Stopping if reuse => {
                info!(instance_id, status = %description.status, "Instance already stopped");
                return Ok(TerminationOutcome::AlreadyStopped);
            }
            _ => {}
        }

        if reuse {
            match self.provider.stop(instance_id).await {
                Ok(()) => {
                    info!(instance_id, "Instance stopped");
                    return Ok(TerminationOutcome::Stopped);
                }
                Err(e) if e.is(ProviderErrorKind::UnsupportedOperation) => {
                    warn!(instance_id, error = %e, "Stop not supported, terminating instead");
                }
                Err(e) if e.is(ProviderErrorKind::NotFound) => {
                    return Ok(TerminationOutcome::NotFound);
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.cancel_spot_request(instance_id, spot_request_id)
            .await?;

        match self.provider.terminate(instance_id).await {
            Ok(()) => {
                info!(instance_id, "Instance terminated");
                Ok(TerminationOutcome::Terminated)
            }
            Err(e) if e.is(ProviderErrorKind::NotFound) => Ok(TerminationOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel_spot_request(&self, instance_id: &str, request_id: Option<&str>) -> Result<()> {
        let Some(request_id) = request_id else {
            return Ok(());
        };

        match self.provider.cancel_spot_request(request_id).await {
            Ok(()) => {
                info!(instance_id, spot_request_id = request_id, "Spot request cancelled");
                Ok(())
            }
            Err(e) if e.is(ProviderErrorKind::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
