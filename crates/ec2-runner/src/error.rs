// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for ec2-runner.

use std::time::Duration;

use thiserror::Error;

use crate::provider::{InstanceStatus, ProviderError};

/// Why an instance did not reach `running`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotRunningReason {
    /// Wait budget exhausted.
    TimedOut,
    /// Instance entered a status it cannot run from.
    Failed(InstanceStatus),
}

impl std::fmt::Display for NotRunningReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotRunningReason::TimedOut => f.write_str("timed out"),
            NotRunningReason::Failed(status) => write!(f, "entered state {}", status),
        }
    }
}

/// Lifecycle errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Unrecoverable provider failure.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Runner registry failure.
    #[error("Registry error: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    /// Every launch attempt hit a capacity failure.
    #[error("No capacity after {attempts} launch attempts, last error: {last}")]
    Acquisition {
        /// Launch attempts made.
        attempts: usize,
        /// Last observed failure.
        last: ProviderError,
    },

    /// Instance did not reach `running`.
    #[error("Instance {instance_id} did not reach running within {}s: {reason}", .waited.as_secs())]
    InstanceNotRunning {
        /// Instance id.
        instance_id: String,
        /// Wait budget.
        waited: Duration,
        /// Why.
        reason: NotRunningReason,
    },

    /// Runners did not all come online.
    #[error(
        "Runners of instance {instance_id} not online after {}s ({ready}/{expected} ready)",
        .waited.as_secs()
    )]
    RegistrationTimeout {
        /// Instance id.
        instance_id: String,
        /// Elapsed poll time.
        waited: Duration,
        /// Runners online at the last tick.
        ready: usize,
        /// Runners expected.
        expected: usize,
    },

    /// Publishing outputs failed.
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type using ec2-runner Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_name_instance_and_budget() {
        let not_running = Error::InstanceNotRunning {
            instance_id: "i-1".to_string(),
            waited: Duration::from_secs(300),
            reason: NotRunningReason::TimedOut,
        };
        assert_eq!(
            not_running.to_string(),
            "Instance i-1 did not reach running within 300s: timed out"
        );

        let registration = Error::RegistrationTimeout {
            instance_id: "i-1".to_string(),
            waited: Duration::from_secs(300),
            ready: 1,
            expected: 2,
        };
        assert_eq!(
            registration.to_string(),
            "Runners of instance i-1 not online after 300s (1/2 ready)"
        );
    }

    #[test]
    fn test_failed_state_reason() {
        let err = Error::InstanceNotRunning {
            instance_id: "i-2".to_string(),
            waited: Duration::from_secs(300),
            reason: NotRunningReason::Failed(InstanceStatus::Terminated),
        };
        assert!(err.to_string().ends_with("entered state terminated"));
    }
}
