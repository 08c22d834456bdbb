// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! ec2-runner - start or stop an EC2 self-hosted runner
//!
//! Runs one phase per invocation:
//! - `start`: acquire an instance, publish its id, wait for its runners
//! - `stop`: delete the runners, then stop or terminate the instance

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use ec2_runner::Workflow;
use ec2_runner::config::{Action, Cli, Config};
use ec2_runner::outputs;
use ec2_runner::provider::{ComputeProvider, Ec2Provider};
use ec2_runner::registry::{GithubConfig, GithubRegistry};
use ec2_runner_aws::{Credentials, Ec2Client, Ec2Config};

async fn run(config: Config) -> anyhow::Result<()> {
    let mut ec2_config = Ec2Config::new(
        &config.aws.region,
        Credentials::from_env().context("reading AWS credentials")?,
    );
    if let Some(endpoint) = &config.aws.endpoint {
        ec2_config = ec2_config.with_endpoint(endpoint);
    }
    let provider = Arc::new(Ec2Provider::new(Ec2Client::new(ec2_config)?));
    info!(provider = provider.provider_type(), region = %config.aws.region, "Provider initialized");

    let registry = Arc::new(GithubRegistry::new(GithubConfig::new(
        &config.github.api_url,
        &config.github.owner,
        &config.github.repo,
        &config.github.token,
    ))?);

    let workflow = Workflow::new(provider, registry, Arc::from(outputs::from_env()));

    match &config.action {
        Action::Start(start) => {
            let outcome = workflow.start(&config.github, start).await?;
            info!(
                instance_id = %outcome.instance_id,
                runners = ?outcome.runners,
                reused = outcome.reused,
                "Runners are online"
            );
        }
        Action::Stop(stop) => {
            let outcome = workflow.stop(stop).await?;
            info!(
                instance_id = %stop.instance_id,
                removed = outcome.removed_runners.len(),
                instance = %outcome.instance,
                "Stop complete"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ec2_runner=info,ec2_runner_aws=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let result = match Cli::parse().into_config() {
        Ok(config) => run(config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
