// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request and response types for the EC2 client.

use std::fmt;

/// Instance lifecycle state as reported by EC2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    /// Instance is launching or starting.
    Pending,
    /// Instance is running.
    Running,
    /// Instance is being terminated.
    ShuttingDown,
    /// Instance is gone.
    Terminated,
    /// Instance is being stopped.
    Stopping,
    /// Instance is stopped and can be started again.
    Stopped,
    /// A state name this client does not know about.
    Unknown(String),
}

impl InstanceState {
    /// Parse an EC2 state name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "shutting-down" => InstanceState::ShuttingDown,
            "terminated" => InstanceState::Terminated,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            other => InstanceState::Unknown(other.to_string()),
        }
    }

    /// EC2 state name.
    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Unknown(name) => name,
        }
    }

    /// True for states the instance never comes back from.
    pub fn is_gone(&self) -> bool {
        matches!(self, InstanceState::ShuttingDown | InstanceState::Terminated)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An EC2 instance as returned by `DescribeInstances` / `RunInstances`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Instance id, e.g. `i-0abc...`.
    pub instance_id: String,
    /// Current state.
    pub state: InstanceState,
    /// Instance type, e.g. `c6i.large`.
    pub instance_type: Option<String>,
    /// Image the instance was launched from.
    pub image_id: Option<String>,
    /// Subnet the instance lives in.
    pub subnet_id: Option<String>,
    /// Associated spot request, for spot instances.
    pub spot_instance_request_id: Option<String>,
    /// `spot`, `scheduled`, or absent for on-demand.
    pub lifecycle: Option<String>,
}

/// A resource tag.
#[derive(Debug, Clone, PartialEq, Eq)]
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

/// A `DescribeInstances` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Filter name, e.g. `instance-state-name` or `tag:Name`.
    pub name: String,
    /// Accepted values.
    pub values: Vec<String>,
}

impl Filter {
    /// Create a single-valued filter.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: vec![value.into()],
        }
    }
}

/// Parameters for `DescribeInstances`.
#[derive(Debug, Clone, Default)]
pub struct DescribeInstancesRequest {
    /// Restrict to these instance ids.
    pub instance_ids: Vec<String>,
    /// Filters, ANDed together.
    pub filters: Vec<Filter>,
}

impl DescribeInstancesRequest {
    /// Describe a single instance by id.
    pub fn by_id(instance_id: impl Into<String>) -> Self {
        Self {
            instance_ids: vec![instance_id.into()],
            filters: Vec::new(),
        }
    }

    /// Describe instances matching filters.
    pub fn with_filters(filters: Vec<Filter>) -> Self {
        Self {
            instance_ids: Vec::new(),
            filters,
        }
    }
}

/// Spot request persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotInstanceType {
    /// Request is fulfilled once.
    OneTime,
    /// Request is re-fulfilled after interruption or stop/start.
    Persistent,
}

impl SpotInstanceType {
    /// EC2 wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotInstanceType::OneTime => "one-time",
            SpotInstanceType::Persistent => "persistent",
        }
    }
}

/// What happens to a spot instance when capacity is reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionBehavior {
    /// Instance is stopped and can be restarted.
    Stop,
    /// Instance is terminated.
    Terminate,
}

impl InterruptionBehavior {
    /// EC2 wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptionBehavior::Stop => "stop",
            InterruptionBehavior::Terminate => "terminate",
        }
    }
}

/// Spot market options for `RunInstances`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotOptions {
    /// Request persistence.
    pub instance_type: SpotInstanceType,
    /// Interruption behavior.
    pub interruption_behavior: InterruptionBehavior,
}

/// Root volume settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    /// Device name, e.g. `/dev/sda1`.
    pub device_name: String,
    /// Volume size in GiB.
    pub volume_size_gib: u32,
}

/// Parameters for launching exactly one instance.
#[derive(Debug, Clone, Default)]
pub struct RunInstancesRequest {
    /// Image id.
    pub image_id: String,
    /// Instance type.
    pub instance_type: String,
    /// Plain-text user data; base64-encoded by the client.
    pub user_data: Option<String>,
    /// Subnet to launch into.
    pub subnet_id: Option<String>,
    /// Security groups.
    pub security_group_ids: Vec<String>,
    /// IAM instance profile name.
    pub iam_instance_profile: Option<String>,
    /// Root volume override.
    pub block_device: Option<BlockDevice>,
    /// Tags applied to the instance and its volumes.
    pub tags: Vec<Tag>,
    /// `stop` or `terminate` on OS-initiated shutdown.
    pub shutdown_behavior: Option<String>,
    /// Spot market options; `None` launches on-demand.
    pub spot: Option<SpotOptions>,
}
