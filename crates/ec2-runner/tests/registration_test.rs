// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registration poller timing, with tokio's clock paused.

use std::sync::Arc;
use std::time::Duration;

use ec2_runner::Error;
use ec2_runner::registration::{RegistrationPoller, RegistrationPollerConfig};
use ec2_runner::registry::mock::runner;
use ec2_runner::registry::{MockRegistry, RegistryError, RunnerDescriptor};
use ec2_runner::runners::RunnerSetInfo;
use tokio::time::Instant;

fn online_set(instance_id: &str, count: u32) -> Vec<RunnerDescriptor> {
    RunnerSetInfo::derive(instance_id, count)
        .runners
        .iter()
        .enumerate()
        .map(|(i, name)| runner(i as u64 + 1, name, true, &[instance_id]))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_resolves_on_fourth_tick() {
    let registry = Arc::new(MockRegistry::new().with_list_responses(vec![
        Ok(vec![]),
        Ok(vec![]),
        Ok(vec![]),
        Ok(online_set("i-1", 2)),
    ]));
    let poller = RegistrationPoller::new(registry.clone(), RegistrationPollerConfig::default());
    let runner_set = RunnerSetInfo::derive("i-1", 2);
    let started = Instant::now();

    let online = poller.wait(&runner_set).await.unwrap();

    assert_eq!(online.len(), 2);
    assert_eq!(registry.list_calls().await, 4);
    // 30 s quiet period + 4 ticks of 10 s
    assert_eq!(started.elapsed(), Duration::from_secs(70));
}

#[tokio::test(start_paused = true)]
async fn test_times_out_and_stops_polling() {
    let registry = Arc::new(MockRegistry::new());
    let poller = RegistrationPoller::new(registry.clone(), RegistrationPollerConfig::default());
    let runner_set = RunnerSetInfo::derive("i-1", 1);

    let err = poller.wait(&runner_set).await.unwrap_err();

    match err {
        Error::RegistrationTimeout {
            instance_id,
            waited,
            ready,
            expected,
        } => {
            assert_eq!(instance_id, "i-1");
            assert_eq!(waited, Duration::from_secs(300));
            assert_eq!(ready, 0);
            assert_eq!(expected, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    let calls = registry.list_calls().await;
    assert_eq!(calls, 30);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(registry.list_calls().await, calls);
}

#[tokio::test(start_paused = true)]
async fn test_partial_set_keeps_waiting() {
    let mut partial = online_set("i-1", 2);
    partial[1].status = ec2_runner::registry::RunnerStatus::Offline;
    let registry = Arc::new(
        MockRegistry::new().with_list_responses(vec![Ok(partial), Ok(online_set("i-1", 2))]),
    );
    let poller = RegistrationPoller::new(registry.clone(), RegistrationPollerConfig::default());

    poller
        .wait(&RunnerSetInfo::derive("i-1", 2))
        .await
        .unwrap();

    assert_eq!(registry.list_calls().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_only_expected_names_count() {
    let mut runners = online_set("i-other", 2);
    runners.push(runner(10, "i-1_runner_1", false, &["i-1"]));
    let registry = Arc::new(
        MockRegistry::new()
            .with_list_responses(vec![Ok(runners)])
            .with_runners(online_set("i-1", 1)),
    );
    let poller = RegistrationPoller::new(registry.clone(), RegistrationPollerConfig::default());

    let online = poller
        .wait(&RunnerSetInfo::derive("i-1", 1))
        .await
        .unwrap();

    assert_eq!(online[0].name, "i-1_runner_1");
    assert_eq!(registry.list_calls().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_counts_as_empty_tick() {
    let registry = Arc::new(MockRegistry::new().with_list_responses(vec![
        Err(RegistryError::Api {
            status: 502,
            message: "bad gateway".to_string(),
        }),
        Ok(online_set("i-1", 1)),
    ]));
    let poller = RegistrationPoller::new(registry.clone(), RegistrationPollerConfig::default());

    poller
        .wait(&RunnerSetInfo::derive("i-1", 1))
        .await
        .unwrap();

    assert_eq!(registry.list_calls().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_error_aborts() {
    let registry = Arc::new(MockRegistry::new().with_list_responses(vec![Err(
        RegistryError::Api {
            status: 401,
            message: "Bad credentials".to_string(),
        },
    )]));
    let poller = RegistrationPoller::new(registry.clone(), RegistrationPollerConfig::default());

    let err = poller
        .wait(&RunnerSetInfo::derive("i-1", 1))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Registry(_)));
    assert_eq!(registry.list_calls().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_custom_timings() {
    let registry = Arc::new(MockRegistry::new());
    let config = RegistrationPollerConfig {
        quiet_period: Duration::from_secs(5),
        poll_interval: Duration::from_secs(1),
        timeout: Duration::from_secs(3),
    };
    let poller = RegistrationPoller::new(registry.clone(), config);
    let started = Instant::now();

    poller
        .wait(&RunnerSetInfo::derive("i-1", 1))
        .await
        .unwrap_err();

    // Ticks at 1, 2, 3 poll; tick 4 exceeds the budget.
    assert_eq!(registry.list_calls().await, 3);
    assert_eq!(started.elapsed(), Duration::from_secs(9));
}
