// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock provider for testing.
//!
//! Keeps instances in memory, records every call, and lets tests script the
//! outcome of individual calls (e.g. "first launch fails for capacity, the
//! second succeeds").

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::*;

/// A call received by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    /// `find_stopped_instance`.
    FindStopped,
    /// `launch` with the attempt parameters.
    Launch(LaunchAttempt),
    /// `start`.
    Start(String),
    /// `describe`.
    Describe(String),
    /// `stop`.
    Stop(String),
    /// `terminate`.
    Terminate(String),
    /// `cancel_spot_request`.
    CancelSpotRequest(String),
    /// `wait_until_running`.
    WaitUntilRunning(String),
}

#[derive(Default)]
struct MockState {
    instances: HashMap<String, InstanceDescription>,
    stopped_candidate: Option<String>,
    launch_results: VecDeque<ProviderResult<String>>,
    start_results: VecDeque<ProviderResult<()>>,
    stop_results: VecDeque<ProviderResult<()>>,
    wait_results: VecDeque<ProviderResult<WaitOutcome>>,
    calls: Vec<ProviderCall>,
    next_id: u32,
}

/// Mock provider for testing.
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create an empty mock where every call succeeds.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Register an existing instance.
    pub fn with_instance(mut self, description: InstanceDescription) -> Self {
        let state = self.state.get_mut();
        state
            .instances
            .insert(description.instance_id.clone(), description);
        self
    }

    /// Register a stopped instance that `find_stopped_instance` returns.
    pub fn with_stopped_instance(self, instance_id: &str) -> Self {
        let mut provider = self.with_instance(InstanceDescription {
            instance_id: instance_id.to_string(),
            status: InstanceStatus::Stopped,
            spot_request_id: None,
        });
        provider.state.get_mut().stopped_candidate = Some(instance_id.to_string());
        provider
    }

    /// Script launch outcomes, consumed in order. `Ok` carries the instance id.
    /// Once exhausted, launches succeed with generated ids.
    pub fn with_launch_results(mut self, results: Vec<ProviderResult<String>>) -> Self {
        self.state.get_mut().launch_results.extend(results);
        self
    }

    /// Script start outcomes, consumed in order.
    pub fn with_start_results(mut self, results: Vec<ProviderResult<()>>) -> Self {
        self.state.get_mut().start_results.extend(results);
        self
    }

    /// Script stop outcomes, consumed in order.
    pub fn with_stop_results(mut self, results: Vec<ProviderResult<()>>) -> Self {
        self.state.get_mut().stop_results.extend(results);
        self
    }

    /// Script running-wait outcomes, consumed in order.
    pub fn with_wait_results(mut self, results: Vec<ProviderResult<WaitOutcome>>) -> Self {
        self.state.get_mut().wait_results.extend(results);
        self
    }

    /// All calls received so far.
    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls matching a predicate.
    pub async fn count_calls(&self, predicate: impl Fn(&ProviderCall) -> bool) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| predicate(c))
            .count()
    }

    /// Current status of an instance.
    pub async fn status_of(&self, instance_id: &str) -> Option<InstanceStatus> {
        self.state
            .lock()
            .await
            .instances
            .get(instance_id)
            .map(|i| i.status.clone())
    }
}

fn set_status(state: &mut MockState, instance_id: &str, status: InstanceStatus) {
    if let Some(instance) = state.instances.get_mut(instance_id) {
        instance.status = status;
    }
}

fn not_found(instance_id: &str) -> ProviderError {
    ProviderError::new(
        ProviderErrorKind::NotFound,
        format!("instance {} does not exist", instance_id),
    )
}

#[async_trait]
impl ComputeProvider for MockProvider {
    fn provider_type(&self) -> &'static str {
        "mock"
    }

    async fn find_stopped_instance(
        &self,
        _filter: &ReuseFilter,
    ) -> ProviderResult<Option<InstanceHandle>> {
        let mut state = self.state.lock().await;
        state.calls.push(ProviderCall::FindStopped);

        let candidate = state.stopped_candidate.clone().filter(|id| {
            state
                .instances
                .get(id)
                .is_some_and(|i| i.status == InstanceStatus::Stopped)
        });
        Ok(candidate.map(InstanceHandle::new))
    }

    async fn launch(
        &self,
        _request: &ProvisioningRequest,
        attempt: &LaunchAttempt,
    ) -> ProviderResult<InstanceHandle> {
        let mut state = self.state.lock().await;
        state.calls.push(ProviderCall::Launch(attempt.clone()));

        let instance_id = match state.launch_results.pop_front() {
            Some(Ok(id)) => id,
            Some(Err(e)) => return Err(e),
            None => {
                state.next_id += 1;
                format!("i-mock{:04}", state.next_id)
            }
        };

        let spot_request_id = (attempt.market == MarketType::Spot)
            .then(|| format!("sir-{}", instance_id.trim_start_matches("i-")));
        state.instances.insert(
            instance_id.clone(),
            InstanceDescription {
                instance_id: instance_id.clone(),
                status: InstanceStatus::Pending,
                spot_request_id,
            },
        );

        Ok(InstanceHandle::new(instance_id))
    }

    async fn start(&self, instance_id: &str, _user_data: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(ProviderCall::Start(instance_id.to_string()));

        if let Some(result) = state.start_results.pop_front() {
            result?;
        }
        if !state.instances.contains_key(instance_id) {
            return Err(not_found(instance_id));
        }
        set_status(&mut state, instance_id, InstanceStatus::Pending);
        Ok(())
    }

    async fn describe(&self, instance_id: &str) -> ProviderResult<Option<InstanceDescription>> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(ProviderCall::Describe(instance_id.to_string()));
        Ok(state.instances.get(instance_id).cloned())
    }

    async fn stop(&self, instance_id: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(ProviderCall::Stop(instance_id.to_string()));

        if let Some(result) = state.stop_results.pop_front() {
            result?;
        }
        if !state.instances.contains_key(instance_id) {
            return Err(not_found(instance_id));
        }
        set_status(&mut state, instance_id, InstanceStatus::Stopped);
        Ok(())
    }

    async fn terminate(&self, instance_id: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(ProviderCall::Terminate(instance_id.to_string()));

        if !state.instances.contains_key(instance_id) {
            return Err(not_found(instance_id));
        }
        set_status(&mut state, instance_id, InstanceStatus::Terminated);
        Ok(())
    }

    async fn cancel_spot_request(&self, request_id: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(ProviderCall::CancelSpotRequest(request_id.to_string()));
        Ok(())
    }

    async fn wait_until_running(
        &self,
        instance_id: &str,
        _max_wait: Duration,
    ) -> ProviderResult<WaitOutcome> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(ProviderCall::WaitUntilRunning(instance_id.to_string()));

        let outcome = match state.wait_results.pop_front() {
            Some(result) => result?,
            None => WaitOutcome::Running,
        };
        if outcome == WaitOutcome::Running {
            set_status(&mut state, instance_id, InstanceStatus::Running);
        }
        Ok(outcome)
    }
}
