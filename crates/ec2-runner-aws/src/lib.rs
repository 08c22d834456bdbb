// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! EC2 client for ec2-runner
//!
//! A deliberately small client for the EC2 Query API covering only what an
//! ephemeral CI runner needs: launching, starting, stopping and terminating a
//! single instance, finding stopped instances by filter, cancelling spot
//! requests, and waiting for an instance to reach `running`.
//!
//! Requests are signed with AWS Signature Version 4 and sent as form-encoded
//! `POST` bodies; responses are parsed from XML.
//!
//! # Example
//!
//! ```no_run
//! use ec2_runner_aws::{DescribeInstancesRequest, Ec2Client};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Ec2Client::from_env()?;
//! let instances = client
//!     .describe_instances(&DescribeInstancesRequest::by_id("i-0123456789abcdef0"))
//!     .await?;
//! for instance in instances {
//!     println!("{} is {}", instance.instance_id, instance.state);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
pub mod signing;
mod types;
mod xml;

pub use client::{API_VERSION, Ec2Client, describe_instances_params, run_instances_params};
pub use config::{Credentials, Ec2Config, default_endpoint};
pub use error::{Ec2Error, Result};
pub use types::{
    BlockDevice, DescribeInstancesRequest, Filter, Instance, InstanceState, InterruptionBehavior,
    RunInstancesRequest, SpotInstanceType, SpotOptions, Tag,
};
