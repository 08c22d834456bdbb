// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock registry for testing.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::*;

#[derive(Default)]
struct MockState {
    runners: Vec<RunnerDescriptor>,
    list_responses: VecDeque<RegistryResult<Vec<RunnerDescriptor>>>,
    failing_deletes: HashSet<u64>,
    deleted: Vec<u64>,
    list_calls: usize,
    token_requests: usize,
}

/// Mock registry for testing.
///
/// `list_runners` first drains scripted responses, then reports the current
/// runner set.
pub struct MockRegistry {
    state: Mutex<MockState>,
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Set the current runner set.
    pub fn with_runners(mut self, runners: Vec<RunnerDescriptor>) -> Self {
        self.state.get_mut().runners = runners;
        self
    }

    /// Script `list_runners` responses, consumed one per call.
    pub fn with_list_responses(
        mut self,
        responses: Vec<RegistryResult<Vec<RunnerDescriptor>>>,
    ) -> Self {
        self.state.get_mut().list_responses.extend(responses);
        self
    }

    /// Make deletion of this runner fail with a server error.
    pub fn with_failing_delete(mut self, runner_id: u64) -> Self {
        self.state.get_mut().failing_deletes.insert(runner_id);
        self
    }

    /// Ids deleted so far, in order.
    pub async fn deleted(&self) -> Vec<u64> {
        self.state.lock().await.deleted.clone()
    }

    /// Number of `list_runners` calls.
    pub async fn list_calls(&self) -> usize {
        self.state.lock().await.list_calls
    }

    /// Number of `registration_token` calls.
    pub async fn token_requests(&self) -> usize {
        self.state.lock().await.token_requests
    }
}

/// Build a runner descriptor for tests.
pub fn runner(id: u64, name: &str, online: bool, labels: &[&str]) -> RunnerDescriptor {
    RunnerDescriptor {
        id,
        name: name.to_string(),
        status: if online {
            RunnerStatus::Online
        } else {
            RunnerStatus::Offline
        },
        busy: false,
        labels: labels
            .iter()
            .map(|l| RunnerLabel {
                name: l.to_string(),
            })
            .collect(),
    }
}

#[async_trait]
impl RunnerRegistry for MockRegistry {
    async fn list_runners(&self) -> RegistryResult<Vec<RunnerDescriptor>> {
        let mut state = self.state.lock().await;
        state.list_calls += 1;
        match state.list_responses.pop_front() {
            Some(response) => response,
            None => Ok(state.runners.clone()),
        }
    }

    async fn delete_runner(&self, runner_id: u64) -> RegistryResult<()> {
        let mut state = self.state.lock().await;
        if state.failing_deletes.contains(&runner_id) {
            return Err(RegistryError::Api {
                status: 500,
                message: format!("failed to delete runner {}", runner_id),
            });
        }
        state.runners.retain(|r| r.id != runner_id);
        state.deleted.push(runner_id);
        Ok(())
    }

    async fn registration_token(&self) -> RegistryResult<String> {
        let mut state = self.state.lock().await;
        state.token_requests += 1;
        Ok(format!("mock-registration-token-{}", state.token_requests))
    }
}
