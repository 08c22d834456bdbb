// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runner registry trait definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error from the runner registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response.
    #[error("registry returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or message.
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("failed to decode registry response: {0}")]
    Decode(String),
}

impl RegistryError {
    /// Whether retrying the same call later may succeed.
    ///
    /// Connection failures, timeouts, 5xx and 429 are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Http(e) => e.is_connect() || e.is_timeout(),
            RegistryError::Api { status, .. } => *status >= 500 || *status == 429,
            RegistryError::Decode(_) => false,
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Runner connection status as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerStatus {
    /// Connected and able to take jobs.
    Online,
    /// Not connected.
    Offline,
    /// Any other status string.
    #[serde(other)]
    Unknown,
}

/// A label attached to a runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerLabel {
    /// Label name.
    pub name: String,
}

/// A registered runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerDescriptor {
    /// Registry-assigned id.
    pub id: u64,
    /// Runner name.
    pub name: String,
    /// Connection status.
    pub status: RunnerStatus,
    /// Whether a job is running.
    #[serde(default)]
    pub busy: bool,
    /// Labels.
    #[serde(default)]
    pub labels: Vec<RunnerLabel>,
}

impl RunnerDescriptor {
    /// Whether the runner carries a label with this name.
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }

    /// Whether the runner is online.
    pub fn is_online(&self) -> bool {
        self.status == RunnerStatus::Online
    }
}

/// CI platform registry of self-hosted runners.
#[async_trait]
pub trait RunnerRegistry: Send + Sync {
    /// List every registered runner.
    async fn list_runners(&self) -> RegistryResult<Vec<RunnerDescriptor>>;

    /// Delete a runner registration.
    async fn delete_runner(&self, runner_id: u64) -> RegistryResult<()>;

    /// Obtain a short-lived token runner agents register with.
    async fn registration_token(&self) -> RegistryResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_descriptor_deserializes() {
        let runner: RunnerDescriptor = serde_json::from_str(
            r#"{
                "id": 23,
                "name": "i-1_runner_1",
                "os": "linux",
                "status": "online",
                "busy": false,
                "labels": [
                    {"id": 5, "name": "self-hosted", "type": "read-only"},
                    {"id": 7, "name": "i-1", "type": "custom"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(runner.id, 23);
        assert!(runner.is_online());
        assert!(runner.has_label("i-1"));
        assert!(!runner.has_label("i-2"));
    }

    #[test]
    fn test_unknown_status() {
        let runner: RunnerDescriptor =
            serde_json::from_str(r#"{"id": 1, "name": "r", "status": "idle"}"#).unwrap();
        assert_eq!(runner.status, RunnerStatus::Unknown);
        assert!(runner.labels.is_empty());
    }

    #[test]
    fn test_transient_classification() {
        let server_error = RegistryError::Api {
            status: 502,
            message: String::new(),
        };
        let rate_limited = RegistryError::Api {
            status: 429,
            message: String::new(),
        };
        let unauthorized = RegistryError::Api {
            status: 401,
            message: "Bad credentials".to_string(),
        };

        assert!(server_error.is_transient());
        assert!(rate_limited.is_transient());
        assert!(!unauthorized.is_transient());
        assert!(!RegistryError::Decode("x".to_string()).is_transient());
    }
}
