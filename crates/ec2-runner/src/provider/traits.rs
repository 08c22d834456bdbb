// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compute provider trait definitions.
//!
//! Defines the abstract interface to the cloud that hosts runner instances,
//! and the closed set of failure kinds the lifecycle logic branches on.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Classified provider failure.
///
/// The provider adapter maps every raw API failure onto one of these; the
/// acquisition and termination logic never inspects error codes directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// No capacity for the requested type/market/zone right now.
    CapacityUnavailable,
    /// The spot request backing an instance is in a state that forbids the call.
    SpotStateConflict,
    /// The call is not supported for this instance configuration.
    UnsupportedOperation,
    /// The referenced instance or spot request does not exist.
    NotFound,
    /// Anything else. Never retried.
    Other,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderErrorKind::CapacityUnavailable => "capacity unavailable",
            ProviderErrorKind::SpotStateConflict => "spot request state conflict",
            ProviderErrorKind::UnsupportedOperation => "unsupported operation",
            ProviderErrorKind::NotFound => "not found",
            ProviderErrorKind::Other => "provider error",
        };
        f.write_str(name)
    }
}

/// Error from a provider operation.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    /// Classified kind.
    pub kind: ProviderErrorKind,
    /// Message from the provider, including its raw error code.
    pub message: String,
}

impl ProviderError {
    /// Create an error of the given kind.
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a capacity failure.
    pub fn capacity(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::CapacityUnavailable, message)
    }

    /// Shorthand for an unclassified failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Other, message)
    }

    /// Check the error kind.
    pub fn is(&self, kind: ProviderErrorKind) -> bool {
        self.kind == kind
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Capacity market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarketType {
    /// Spot capacity: cheaper, may be unavailable or reclaimed.
    #[default]
    Spot,
    /// On-demand capacity.
    OnDemand,
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Spot => f.write_str("spot"),
            MarketType::OnDemand => f.write_str("on-demand"),
        }
    }
}

/// Key/value tag applied to instances and mirrored into runner labels.
///
/// Deserializes from the `[{"Key": "...", "Value": "..."}]` form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Create a tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Root volume override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Root device name, e.g. `/dev/sda1`.
    pub device_name: String,
    /// Size in GiB.
    pub size_gib: u32,
}

/// Everything needed to obtain one runner instance.
///
/// Built once per start invocation and never mutated; each launch attempt
/// pairs it with a [`LaunchAttempt`].
#[derive(Debug, Clone)]
pub struct ProvisioningRequest {
    /// Image id.
    pub image_id: String,
    /// Instance type.
    pub instance_type: String,
    /// Runner agents per instance.
    pub runner_count: u32,
    /// Candidate subnets; empty means provider default.
    pub subnet_ids: Vec<String>,
    /// Security group.
    pub security_group_id: Option<String>,
    /// IAM instance profile.
    pub iam_role_name: Option<String>,
    /// Root volume override.
    pub volume: Option<VolumeSpec>,
    /// Tags for the instance and its volumes; also the reuse match key.
    pub tags: Vec<Tag>,
    /// Preferred market.
    pub market: MarketType,
    /// Whether stopped instances are reused and spot requests are persistent.
    pub reuse: bool,
    /// Boot payload.
    pub user_data: String,
}

/// One concrete launch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchAttempt {
    /// Subnet for this attempt.
    pub subnet_id: Option<String>,
    /// Market for this attempt.
    pub market: MarketType,
}

/// Criteria a stopped instance must meet to be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReuseFilter {
    /// Every tag must be present with the same value.
    pub tags: Vec<Tag>,
    /// Instance type must match.
    pub instance_type: String,
    /// Image must match.
    pub image_id: String,
}

impl From<&ProvisioningRequest> for ReuseFilter {
    fn from(request: &ProvisioningRequest) -> Self {
        Self {
            tags: request.tags.clone(),
            instance_type: request.instance_type.clone(),
            image_id: request.image_id.clone(),
        }
    }
}

/// Reference to a provider instance. Used only as a correlation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    /// Provider-assigned id.
    pub instance_id: String,
}

impl InstanceHandle {
    /// Wrap an instance id.
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
        }
    }
}

/// Infrastructure-level instance status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    /// Launching or starting.
    Pending,
    /// Running.
    Running,
    /// Stopping.
    Stopping,
    /// Stopped.
    Stopped,
    /// Terminating.
    ShuttingDown,
    /// Gone.
    Terminated,
    /// Unrecognized status name.
    Unknown(String),
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Pending => f.write_str("pending"),
            InstanceStatus::Running => f.write_str("running"),
            InstanceStatus::Stopping => f.write_str("stopping"),
            InstanceStatus::Stopped => f.write_str("stopped"),
            InstanceStatus::ShuttingDown => f.write_str("shutting-down"),
            InstanceStatus::Terminated => f.write_str("terminated"),
            InstanceStatus::Unknown(name) => f.write_str(name),
        }
    }
}

/// Current view of an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDescription {
    /// Instance id.
    pub instance_id: String,
    /// Status.
    pub status: InstanceStatus,
    /// Spot request backing the instance, if any.
    pub spot_request_id: Option<String>,
}

/// How a bounded wait for `running` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Instance is running.
    Running,
    /// Budget exhausted.
    TimedOut,
    /// Instance entered a status it cannot run from.
    Failed(InstanceStatus),
}

/// Trait for compute providers.
///
/// Providers are thin: each method is one provider call (plus whatever
/// request shaping that call needs). Retry and fallback decisions belong to
/// the caller and are driven by [`ProviderErrorKind`].
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Provider type identifier (e.g., "ec2", "mock").
    fn provider_type(&self) -> &'static str;

    /// Find a stopped instance matching the filter.
    ///
    /// If several match, which one is returned is up to the provider.
    async fn find_stopped_instance(
        &self,
        filter: &ReuseFilter,
    ) -> ProviderResult<Option<InstanceHandle>>;

    /// Launch a new instance.
    async fn launch(
        &self,
        request: &ProvisioningRequest,
        attempt: &LaunchAttempt,
    ) -> ProviderResult<InstanceHandle>;

    /// Refresh the boot payload of a stopped instance and start it.
    async fn start(&self, instance_id: &str, user_data: &str) -> ProviderResult<()>;

    /// Describe an instance; `None` if it does not exist.
    async fn describe(&self, instance_id: &str) -> ProviderResult<Option<InstanceDescription>>;

    /// Stop an instance, keeping its volumes.
    async fn stop(&self, instance_id: &str) -> ProviderResult<()>;

    /// Terminate an instance.
    async fn terminate(&self, instance_id: &str) -> ProviderResult<()>;

    /// Cancel a spot request.
    async fn cancel_spot_request(&self, request_id: &str) -> ProviderResult<()>;

    /// Block until the instance is running or `max_wait` elapses.
    async fn wait_until_running(
        &self,
        instance_id: &str,
        max_wait: Duration,
    ) -> ProviderResult<WaitOutcome>;
}
