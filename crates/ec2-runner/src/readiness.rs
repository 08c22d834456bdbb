// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Waiting for an instance to reach `running`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::error::{Error, NotRunningReason, Result};
use crate::provider::{ComputeProvider, WaitOutcome};

/// Readiness wait settings.
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Budget for the instance to reach `running`.
    pub max_wait: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(5 * 60),
        }
    }
}

/// Blocks until an instance is running, delegating to the provider's waiter.
///
/// A timeout or a terminal status is fatal; there is no retry.
pub struct ReadinessWaiter {
    provider: Arc<dyn ComputeProvider>,
    config: ReadinessConfig,
}

impl ReadinessWaiter {
    /// Create a waiter.
    pub fn new(provider: Arc<dyn ComputeProvider>, config: ReadinessConfig) -> Self {
        Self { provider, config }
    }

    /// Wait for the instance.
    pub async fn wait(&self, instance_id: &str) -> Result<()> {
        info!(
            instance_id,
            max_wait_secs = self.config.max_wait.as_secs(),
            "Waiting for instance to be running"
        );

        let reason = match self
            .provider
            .wait_until_running(instance_id, self.config.max_wait)
            .await?
        {
            WaitOutcome::Running => {
                info!(instance_id, "Instance is running");
                return Ok(());
            }
            WaitOutcome::TimedOut => NotRunningReason::TimedOut,
            WaitOutcome::Failed(status) => NotRunningReason::Failed(status),
        };

        error!(instance_id, reason = %reason, "Instance did not start");
        Err(Error::InstanceNotRunning {
            instance_id: instance_id.to_string(),
            waited: self.config.max_wait,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{InstanceStatus, MockProvider};

    #[tokio::test]
    async fn test_running() {
        let provider = Arc::new(MockProvider::new().with_stopped_instance("i-1"));
        let waiter = ReadinessWaiter::new(provider, ReadinessConfig::default());

        waiter.wait("i-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_is_fatal() {
        let provider = Arc::new(MockProvider::new().with_wait_results(vec![Ok(WaitOutcome::TimedOut)]));
        let waiter = ReadinessWaiter::new(provider.clone(), ReadinessConfig::default());

        let err = waiter.wait("i-1").await.unwrap_err();

        match err {
            Error::InstanceNotRunning {
                instance_id,
                waited,
                reason,
            } => {
                assert_eq!(instance_id, "i-1");
                assert_eq!(waited, Duration::from_secs(300));
                assert_eq!(reason, NotRunningReason::TimedOut);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_status() {
        let provider = Arc::new(MockProvider::new().with_wait_results(vec![Ok(
            WaitOutcome::Failed(InstanceStatus::Terminated),
        )]));
        let waiter = ReadinessWaiter::new(provider, ReadinessConfig::default());

        let err = waiter.wait("i-1").await.unwrap_err();
        assert!(matches!(
            err,
            Error::InstanceNotRunning {
                reason: NotRunningReason::Failed(InstanceStatus::Terminated),
                ..
            }
        ));
    }
}
