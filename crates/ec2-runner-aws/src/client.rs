// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ec2Client for the EC2 Query API.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::Ec2Config;
use crate::error::{Ec2Error, Result};
use crate::signing::{FORM_CONTENT_TYPE, sign_form_post};
use crate::types::{DescribeInstancesRequest, Instance, InstanceState, RunInstancesRequest};
use crate::xml::{expect_root, parse_error, parse_instances};

/// EC2 Query API version.
pub const API_VERSION: &str = "2016-11-15";

const SERVICE: &str = "ec2";

/// Client for the handful of EC2 actions needed to manage runner instances.
///
/// Every call is a signed `POST /` with a form-encoded body. Errors returned
/// by EC2 surface as [`Ec2Error::Api`] carrying the raw error code; callers
/// decide what a code means for them.
pub struct Ec2Client {
    http: reqwest::Client,
    config: Ec2Config,
    host: String,
}

impl Ec2Client {
    /// Create a client with the given configuration.
    pub fn new(config: Ec2Config) -> Result<Self> {
        let url = url::Url::parse(&config.endpoint)
            .map_err(|e| Ec2Error::Config(format!("invalid endpoint {}: {}", config.endpoint, e)))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(Ec2Error::Config(format!(
                    "endpoint {} has no host",
                    config.endpoint
                )));
            }
        };

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { http, config, host })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(Ec2Config::from_env()?)
    }

    /// Get the client configuration.
    pub fn config(&self) -> &Ec2Config {
        &self.config
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Sign and send one action, returning the raw response body.
    async fn call(&self, action: &str, params: Vec<(String, String)>) -> Result<String> {
        // The serializer is not Send; it must be gone before the first await.
        let body = {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            form.append_pair("Action", action);
            form.append_pair("Version", API_VERSION);
            for (key, value) in &params {
                form.append_pair(key, value);
            }
            form.finish()
        };

        let signed = sign_form_post(
            &self.config.credentials,
            &self.config.region,
            SERVICE,
            &self.host,
            &body,
            Utc::now(),
        );

        let mut request = self
            .http
            .post(&self.config.endpoint)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header("x-amz-date", &signed.amz_date)
            .header(AUTHORIZATION, &signed.authorization);
        if let Some(token) = &signed.security_token {
            request = request.header("x-amz-security-token", token);
        }

        debug!(action, "Sending EC2 request");
        let response = request.body(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(parse_error(&text).unwrap_or_else(|| Ec2Error::Api {
                code: format!("Http{}", status.as_u16()),
                message: text,
                request_id: None,
            }));
        }

        Ok(text)
    }

    // =========================================================================
    // Instance lifecycle
    // =========================================================================

    /// Launch exactly one instance.
    #[instrument(skip(self, request), fields(image_id = %request.image_id, subnet = ?request.subnet_id, spot = request.spot.is_some()))]
    pub async fn run_instances(&self, request: &RunInstancesRequest) -> Result<Instance> {
        let body = self
            .call("RunInstances", run_instances_params(request))
            .await?;
        let page = parse_instances(&body)?;
        let instance = page.instances.into_iter().next().ok_or_else(|| {
            Ec2Error::UnexpectedResponse("RunInstances returned no instances".to_string())
        })?;

        info!(instance_id = %instance.instance_id, "EC2 instance launched");
        Ok(instance)
    }

    /// Describe instances, following pagination until exhausted.
    #[instrument(skip(self, request))]
    pub async fn describe_instances(
        &self,
        request: &DescribeInstancesRequest,
    ) -> Result<Vec<Instance>> {
        let mut instances = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut params = describe_instances_params(request);
            if let Some(token) = &next_token {
                params.push(("NextToken".to_string(), token.clone()));
            }

            let body = self.call("DescribeInstances", params).await?;
            let page = parse_instances(&body)?;
            instances.extend(page.instances);

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        debug!(count = instances.len(), "Described instances");
        Ok(instances)
    }

    /// Start stopped instances.
    #[instrument(skip(self))]
    pub async fn start_instances(&self, instance_ids: &[String]) -> Result<()> {
        let body = self
            .call("StartInstances", indexed("InstanceId", instance_ids))
            .await?;
        expect_root(&body, "StartInstancesResponse")
    }

    /// Replace the user data of a stopped instance.
    ///
    /// Takes effect on the next start.
    #[instrument(skip(self, user_data))]
    pub async fn modify_user_data(&self, instance_id: &str, user_data: &str) -> Result<()> {
        let params = vec![
            ("InstanceId".to_string(), instance_id.to_string()),
            ("UserData.Value".to_string(), BASE64.encode(user_data)),
        ];
        let body = self.call("ModifyInstanceAttribute", params).await?;
        expect_root(&body, "ModifyInstanceAttributeResponse")
    }

    /// Stop running instances.
    #[instrument(skip(self))]
    pub async fn stop_instances(&self, instance_ids: &[String]) -> Result<()> {
        let body = self
            .call("StopInstances", indexed("InstanceId", instance_ids))
            .await?;
        expect_root(&body, "StopInstancesResponse")
    }

    /// Terminate instances.
    #[instrument(skip(self))]
    pub async fn terminate_instances(&self, instance_ids: &[String]) -> Result<()> {
        let body = self
            .call("TerminateInstances", indexed("InstanceId", instance_ids))
            .await?;
        expect_root(&body, "TerminateInstancesResponse")
    }

    /// Cancel spot instance requests.
    #[instrument(skip(self))]
    pub async fn cancel_spot_instance_requests(&self, request_ids: &[String]) -> Result<()> {
        let body = self
            .call(
                "CancelSpotInstanceRequests",
                indexed("SpotInstanceRequestId", request_ids),
            )
            .await?;
        expect_root(&body, "CancelSpotInstanceRequestsResponse")
    }

    // =========================================================================
    // Waiters
    // =========================================================================

    /// Block until the instance reports `running`, or `max_wait` is used up.
    ///
    /// Polls every `waiter_delay`. A freshly launched instance may not be
    /// visible yet, so `InvalidInstanceID.NotFound` is retried. Entering
    /// `shutting-down`, `terminated` or `stopping` fails immediately.
    #[instrument(skip(self), fields(instance_id = %instance_id))]
    pub async fn wait_until_instance_running(
        &self,
        instance_id: &str,
        max_wait: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + max_wait;
        let request = DescribeInstancesRequest::by_id(instance_id);

        loop {
            match self.describe_instances(&request).await {
                Ok(instances) => match instances.first().map(|i| &i.state) {
                    Some(InstanceState::Running) => return Ok(()),
                    Some(
                        state @ (InstanceState::ShuttingDown
                        | InstanceState::Terminated
                        | InstanceState::Stopping),
                    ) => {
                        return Err(Ec2Error::WaiterFailure {
                            instance_id: instance_id.to_string(),
                            state: state.to_string(),
                        });
                    }
                    state => debug!(state = ?state, "Instance not running yet"),
                },
                Err(e) if e.code() == Some("InvalidInstanceID.NotFound") => {
                    debug!("Instance not visible yet");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Ec2Error::WaiterTimeout {
                    instance_id: instance_id.to_string(),
                    waited: max_wait,
                });
            }
            let delay = self.config.waiter_delay.min(deadline - now);
            tokio::time::sleep(delay).await;
        }
    }
}

// =============================================================================
// Parameter encoding
// =============================================================================

fn indexed(prefix: &str, values: &[String]) -> Vec<(String, String)> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (format!("{}.{}", prefix, i + 1), v.clone()))
        .collect()
}

/// Query parameters for `DescribeInstances`, without pagination.
pub fn describe_instances_params(request: &DescribeInstancesRequest) -> Vec<(String, String)> {
    let mut params = indexed("InstanceId", &request.instance_ids);
    for (i, filter) in request.filters.iter().enumerate() {
        let n = i + 1;
        params.push((format!("Filter.{}.Name", n), filter.name.clone()));
        for (j, value) in filter.values.iter().enumerate() {
            params.push((format!("Filter.{}.Value.{}", n, j + 1), value.clone()));
        }
    }
    params
}

/// Query parameters for `RunInstances`.
pub fn run_instances_params(request: &RunInstancesRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("ImageId".to_string(), request.image_id.clone()),
        ("InstanceType".to_string(), request.instance_type.clone()),
        ("MinCount".to_string(), "1".to_string()),
        ("MaxCount".to_string(), "1".to_string()),
    ];

    if let Some(user_data) = &request.user_data {
        params.push(("UserData".to_string(), BASE64.encode(user_data)));
    }
    if let Some(subnet) = &request.subnet_id {
        params.push(("SubnetId".to_string(), subnet.clone()));
    }
    params.extend(indexed("SecurityGroupId", &request.security_group_ids));
    if let Some(profile) = &request.iam_instance_profile {
        params.push(("IamInstanceProfile.Name".to_string(), profile.clone()));
    }
    if let Some(device) = &request.block_device {
        params.push((
            "BlockDeviceMapping.1.DeviceName".to_string(),
            device.device_name.clone(),
        ));
        params.push((
            "BlockDeviceMapping.1.Ebs.VolumeSize".to_string(),
            device.volume_size_gib.to_string(),
        ));
        params.push((
            "BlockDeviceMapping.1.Ebs.VolumeType".to_string(),
            "gp3".to_string(),
        ));
        params.push((
            "BlockDeviceMapping.1.Ebs.DeleteOnTermination".to_string(),
            "true".to_string(),
        ));
    }
    if !request.tags.is_empty() {
        for (n, resource) in ["instance", "volume"].iter().enumerate() {
            let prefix = format!("TagSpecification.{}", n + 1);
            params.push((format!("{}.ResourceType", prefix), resource.to_string()));
            for (i, tag) in request.tags.iter().enumerate() {
                params.push((format!("{}.Tag.{}.Key", prefix, i + 1), tag.key.clone()));
                params.push((format!("{}.Tag.{}.Value", prefix, i + 1), tag.value.clone()));
            }
        }
    }
    if let Some(behavior) = &request.shutdown_behavior {
        params.push((
            "InstanceInitiatedShutdownBehavior".to_string(),
            behavior.clone(),
        ));
    }
    if let Some(spot) = &request.spot {
        params.push((
            "InstanceMarketOptions.MarketType".to_string(),
            "spot".to_string(),
        ));
        params.push((
            "InstanceMarketOptions.SpotOptions.SpotInstanceType".to_string(),
            spot.instance_type.as_str().to_string(),
        ));
        params.push((
            "InstanceMarketOptions.SpotOptions.InstanceInterruptionBehavior".to_string(),
            spot.interruption_behavior.as_str().to_string(),
        ));
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BlockDevice, Filter, InterruptionBehavior, SpotInstanceType, SpotOptions, Tag,
    };

    fn lookup<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_run_instances_params_on_demand() {
        let request = RunInstancesRequest {
            image_id: "ami-1".to_string(),
            instance_type: "t3.micro".to_string(),
            user_data: Some("#!/bin/bash".to_string()),
            subnet_id: Some("subnet-a".to_string()),
            security_group_ids: vec!["sg-1".to_string()],
            tags: vec![Tag::new("Name", "runner")],
            ..Default::default()
        };

        let params = run_instances_params(&request);

        assert_eq!(lookup(&params, "ImageId"), Some("ami-1"));
        assert_eq!(lookup(&params, "MinCount"), Some("1"));
        assert_eq!(lookup(&params, "UserData"), Some("IyEvYmluL2Jhc2g="));
        assert_eq!(lookup(&params, "SecurityGroupId.1"), Some("sg-1"));
        assert_eq!(lookup(&params, "TagSpecification.1.ResourceType"), Some("instance"));
        assert_eq!(lookup(&params, "TagSpecification.2.ResourceType"), Some("volume"));
        assert_eq!(lookup(&params, "TagSpecification.2.Tag.1.Value"), Some("runner"));
        assert!(lookup(&params, "InstanceMarketOptions.MarketType").is_none());
    }

    #[test]
    fn test_run_instances_params_spot_and_volume() {
        let request = RunInstancesRequest {
            image_id: "ami-1".to_string(),
            instance_type: "c6i.large".to_string(),
            block_device: Some(BlockDevice {
                device_name: "/dev/xvda".to_string(),
                volume_size_gib: 64,
            }),
            shutdown_behavior: Some("stop".to_string()),
            spot: Some(SpotOptions {
                instance_type: SpotInstanceType::Persistent,
                interruption_behavior: InterruptionBehavior::Stop,
            }),
            ..Default::default()
        };

        let params = run_instances_params(&request);

        assert_eq!(lookup(&params, "BlockDeviceMapping.1.DeviceName"), Some("/dev/xvda"));
        assert_eq!(lookup(&params, "BlockDeviceMapping.1.Ebs.VolumeSize"), Some("64"));
        assert_eq!(lookup(&params, "InstanceInitiatedShutdownBehavior"), Some("stop"));
        assert_eq!(lookup(&params, "InstanceMarketOptions.MarketType"), Some("spot"));
        assert_eq!(
            lookup(&params, "InstanceMarketOptions.SpotOptions.SpotInstanceType"),
            Some("persistent")
        );
        assert_eq!(
            lookup(
                &params,
                "InstanceMarketOptions.SpotOptions.InstanceInterruptionBehavior"
            ),
            Some("stop")
        );
        assert!(lookup(&params, "TagSpecification.1.ResourceType").is_none());
    }

    #[test]
    fn test_describe_instances_params() {
        let request = DescribeInstancesRequest::with_filters(vec![
            Filter::new("tag:Name", "runner"),
            Filter::new("instance-state-name", "stopped"),
        ]);

        let params = describe_instances_params(&request);

        assert_eq!(lookup(&params, "Filter.1.Name"), Some("tag:Name"));
        assert_eq!(lookup(&params, "Filter.1.Value.1"), Some("runner"));
        assert_eq!(lookup(&params, "Filter.2.Name"), Some("instance-state-name"));
        assert_eq!(lookup(&params, "Filter.2.Value.1"), Some("stopped"));
    }

    #[test]
    fn test_new_rejects_bad_endpoint() {
        let config = Ec2Config::new("us-east-1", crate::Credentials::new("a", "b"))
            .with_endpoint("not a url");
        assert!(matches!(Ec2Client::new(config), Err(Ec2Error::Config(_))));
    }
}
