// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! EC2-backed compute provider.
//!
//! Shapes requests for [`Ec2Client`] and translates EC2 error codes into
//! [`ProviderErrorKind`]. This is the only place that knows EC2 error codes.

use std::time::Duration;

use async_trait::async_trait;
use ec2_runner_aws::{
    BlockDevice, DescribeInstancesRequest, Ec2Client, Ec2Error, Filter, InstanceState,
    InterruptionBehavior, RunInstancesRequest, SpotInstanceType, SpotOptions,
};
use tracing::{debug, info};

use super::traits::*;

const CAPACITY_CODES: &[&str] = &[
    "InsufficientInstanceCapacity",
    "InsufficientHostCapacity",
    "InsufficientReservedInstanceCapacity",
    "InsufficientCapacity",
    "SpotMaxPriceTooLow",
    "MaxSpotInstanceCountExceeded",
];

const SPOT_STATE_CODES: &[&str] = &["IncorrectSpotRequestState"];

const UNSUPPORTED_CODES: &[&str] = &["UnsupportedOperation", "Unsupported"];

const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidSpotInstanceRequestID.NotFound",
];

/// Classify an EC2 failure.
pub fn classify(err: Ec2Error) -> ProviderError {
    let kind = match err.code() {
        Some(code) if CAPACITY_CODES.contains(&code) => ProviderErrorKind::CapacityUnavailable,
        Some(code) if SPOT_STATE_CODES.contains(&code) => ProviderErrorKind::SpotStateConflict,
        Some(code) if UNSUPPORTED_CODES.contains(&code) => ProviderErrorKind::UnsupportedOperation,
        Some(code) if NOT_FOUND_CODES.contains(&code) => ProviderErrorKind::NotFound,
        _ => ProviderErrorKind::Other,
    };
    ProviderError::new(kind, err.to_string())
}

fn to_status(state: &InstanceState) -> InstanceStatus {
    match state {
        InstanceState::Pending => InstanceStatus::Pending,
        InstanceState::Running => InstanceStatus::Running,
        InstanceState::Stopping => InstanceStatus::Stopping,
        InstanceState::Stopped => InstanceStatus::Stopped,
        InstanceState::ShuttingDown => InstanceStatus::ShuttingDown,
        InstanceState::Terminated => InstanceStatus::Terminated,
        InstanceState::Unknown(name) => InstanceStatus::Unknown(name.clone()),
    }
}

/// Build the `RunInstances` request for one attempt.
///
/// With reuse enabled, spot requests are persistent and interruption stops
/// the instance, so a stopped runner can be started again later. Otherwise
/// spot requests are one-time and everything terminates.
pub fn run_instances_request(
    request: &ProvisioningRequest,
    attempt: &LaunchAttempt,
) -> RunInstancesRequest {
    let spot = match attempt.market {
        MarketType::Spot if request.reuse => Some(SpotOptions {
            instance_type: SpotInstanceType::Persistent,
            interruption_behavior: InterruptionBehavior::Stop,
        }),
        MarketType::Spot => Some(SpotOptions {
            instance_type: SpotInstanceType::OneTime,
            interruption_behavior: InterruptionBehavior::Terminate,
        }),
        MarketType::OnDemand => None,
    };

    RunInstancesRequest {
        image_id: request.image_id.clone(),
        instance_type: request.instance_type.clone(),
        user_data: Some(request.user_data.clone()),
        subnet_id: attempt.subnet_id.clone(),
        security_group_ids: request.security_group_id.iter().cloned().collect(),
        iam_instance_profile: request.iam_role_name.clone(),
        block_device: request.volume.as_ref().map(|v| BlockDevice {
            device_name: v.device_name.clone(),
            volume_size_gib: v.size_gib,
        }),
        tags: request
            .tags
            .iter()
            .map(|t| ec2_runner_aws::Tag::new(&t.key, &t.value))
            .collect(),
        shutdown_behavior: Some(if request.reuse { "stop" } else { "terminate" }.to_string()),
        spot,
    }
}

/// Compute provider backed by the EC2 Query API.
pub struct Ec2Provider {
    client: Ec2Client,
}

impl Ec2Provider {
    /// Wrap an EC2 client.
    pub fn new(client: Ec2Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ComputeProvider for Ec2Provider {
    fn provider_type(&self) -> &'static str {
        "ec2"
    }

    async fn find_stopped_instance(
        &self,
        filter: &ReuseFilter,
    ) -> ProviderResult<Option<InstanceHandle>> {
        let mut filters: Vec<Filter> = filter
            .tags
            .iter()
            .map(|t| Filter::new(format!("tag:{}", t.key), &t.value))
            .collect();
        filters.push(Filter::new("instance-type", &filter.instance_type));
        filters.push(Filter::new("image-id", &filter.image_id));
        filters.push(Filter::new("instance-state-name", "stopped"));

        debug!(filters = ?filters, "Looking for a stopped instance to reuse");

        let instances = self
            .client
            .describe_instances(&DescribeInstancesRequest::with_filters(filters))
            .await
            .map_err(classify)?;

        Ok(instances
            .into_iter()
            .find(|i| !i.state.is_gone())
            .map(|i| InstanceHandle::new(i.instance_id)))
    }

    async fn launch(
        &self,
        request: &ProvisioningRequest,
        attempt: &LaunchAttempt,
    ) -> ProviderResult<InstanceHandle> {
        let instance = self
            .client
            .run_instances(&run_instances_request(request, attempt))
            .await
            .map_err(classify)?;
        Ok(InstanceHandle::new(instance.instance_id))
    }

    async fn start(&self, instance_id: &str, user_data: &str) -> ProviderResult<()> {
        self.client
            .modify_user_data(instance_id, user_data)
            .await
            .map_err(classify)?;
        self.client
            .start_instances(&[instance_id.to_string()])
            .await
            .map_err(classify)
    }

    async fn describe(&self, instance_id: &str) -> ProviderResult<Option<InstanceDescription>> {
        let result = self
            .client
            .describe_instances(&DescribeInstancesRequest::by_id(instance_id))
            .await
            .map_err(classify);

        match result {
            Ok(instances) => Ok(instances.first().map(|i| InstanceDescription {
                instance_id: i.instance_id.clone(),
                status: to_status(&i.state),
                spot_request_id: i.spot_instance_request_id.clone(),
            })),
            Err(e) if e.is(ProviderErrorKind::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn stop(&self, instance_id: &str) -> ProviderResult<()> {
        self.client
            .stop_instances(&[instance_id.to_string()])
            .await
            .map_err(classify)
    }

    async fn terminate(&self, instance_id: &str) -> ProviderResult<()> {
        self.client
            .terminate_instances(&[instance_id.to_string()])
            .await
            .map_err(classify)
    }

    async fn cancel_spot_request(&self, request_id: &str) -> ProviderResult<()> {
        self.client
            .cancel_spot_instance_requests(&[request_id.to_string()])
            .await
            .map_err(classify)
    }

    async fn wait_until_running(
        &self,
        instance_id: &str,
        max_wait: Duration,
    ) -> ProviderResult<WaitOutcome> {
        match self
            .client
            .wait_until_instance_running(instance_id, max_wait)
            .await
        {
            Ok(()) => Ok(WaitOutcome::Running),
            Err(Ec2Error::WaiterTimeout { .. }) => Ok(WaitOutcome::TimedOut),
            Err(Ec2Error::WaiterFailure { state, .. }) => {
                info!(instance_id, state = %state, "Instance left the path to running");
                Ok(WaitOutcome::Failed(to_status(&InstanceState::from_name(
                    &state,
                ))))
            }
            Err(e) => Err(classify(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: &str) -> Ec2Error {
        Ec2Error::Api {
            code: code.to_string(),
            message: "message".to_string(),
            request_id: None,
        }
    }

    fn request(reuse: bool) -> ProvisioningRequest {
        ProvisioningRequest {
            image_id: "ami-1".to_string(),
            instance_type: "t3.micro".to_string(),
            runner_count: 2,
            subnet_ids: vec!["subnet-a".to_string()],
            security_group_id: Some("sg-1".to_string()),
            iam_role_name: Some("runner-role".to_string()),
            volume: Some(VolumeSpec {
                device_name: "/dev/sda1".to_string(),
                size_gib: 40,
            }),
            tags: vec![Tag::new("Name", "ci")],
            market: MarketType::Spot,
            reuse,
            user_data: "#!/bin/bash".to_string(),
        }
    }

    #[test]
    fn test_classify_codes() {
        let cases = [
            (
                "InsufficientInstanceCapacity",
                ProviderErrorKind::CapacityUnavailable,
            ),
            ("SpotMaxPriceTooLow", ProviderErrorKind::CapacityUnavailable),
            (
                "IncorrectSpotRequestState",
                ProviderErrorKind::SpotStateConflict,
            ),
            (
                "UnsupportedOperation",
                ProviderErrorKind::UnsupportedOperation,
            ),
            ("InvalidInstanceID.NotFound", ProviderErrorKind::NotFound),
            ("UnauthorizedOperation", ProviderErrorKind::Other),
        ];
        for (code, kind) in cases {
            assert_eq!(classify(api_error(code)).kind, kind, "code {}", code);
        }
    }

    #[test]
    fn test_classify_keeps_code_in_message() {
        let err = classify(api_error("InsufficientInstanceCapacity"));
        assert!(err.message.contains("InsufficientInstanceCapacity"));
    }

    #[test]
    fn test_classify_non_api_errors_as_other() {
        let err = classify(Ec2Error::UnexpectedResponse("empty".to_string()));
        assert_eq!(err.kind, ProviderErrorKind::Other);
    }

    #[test]
    fn test_spot_attempt_with_reuse_is_persistent() {
        let attempt = LaunchAttempt {
            subnet_id: Some("subnet-a".to_string()),
            market: MarketType::Spot,
        };

        let run = run_instances_request(&request(true), &attempt);

        let spot = run.spot.unwrap();
        assert_eq!(spot.instance_type, SpotInstanceType::Persistent);
        assert_eq!(spot.interruption_behavior, InterruptionBehavior::Stop);
        assert_eq!(run.shutdown_behavior.as_deref(), Some("stop"));
        assert_eq!(run.subnet_id.as_deref(), Some("subnet-a"));
        assert_eq!(run.security_group_ids, vec!["sg-1".to_string()]);
        assert_eq!(run.block_device.unwrap().volume_size_gib, 40);
    }

    #[test]
    fn test_spot_attempt_without_reuse_is_one_time() {
        let attempt = LaunchAttempt {
            subnet_id: None,
            market: MarketType::Spot,
        };

        let run = run_instances_request(&request(false), &attempt);

        let spot = run.spot.unwrap();
        assert_eq!(spot.instance_type, SpotInstanceType::OneTime);
        assert_eq!(spot.interruption_behavior, InterruptionBehavior::Terminate);
        assert_eq!(run.shutdown_behavior.as_deref(), Some("terminate"));
    }

    #[test]
    fn test_on_demand_attempt_has_no_market_options() {
        let attempt = LaunchAttempt {
            subnet_id: None,
            market: MarketType::OnDemand,
        };

        let run = run_instances_request(&request(true), &attempt);

        assert!(run.spot.is_none());
        assert_eq!(run.tags, vec![ec2_runner_aws::Tag::new("Name", "ci")]);
    }
}
