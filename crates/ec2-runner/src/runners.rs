// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runner-set correlation.
//!
//! Runner names are derived from the instance id, so the start phase knows
//! which registrations to wait for without ever seeing a registry id.

use serde::Serialize;

/// Name of runner slot `index` (1-based) on an instance.
///
/// Must match the name the boot payload registers.
pub fn runner_name(instance_id: &str, index: u32) -> String {
    format!("{}_runner_{}", instance_id, index)
}

/// An instance and the runner names it is expected to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunnerSetInfo {
    /// Instance id; also the correlation label on every runner.
    pub instance_id: String,
    /// Expected runner names, in slot order.
    pub runners: Vec<String>,
}

impl RunnerSetInfo {
    /// Derive the runner set for `count` slots on an instance.
    pub fn derive(instance_id: impl Into<String>, count: u32) -> Self {
        let instance_id = instance_id.into();
        let runners = (1..=count).map(|i| runner_name(&instance_id, i)).collect();
        Self {
            instance_id,
            runners,
        }
    }

    /// Number of expected runners.
    pub fn expected(&self) -> usize {
        self.runners.len()
    }

    /// Whether a runner name belongs to this set.
    pub fn contains(&self, name: &str) -> bool {
        self.runners.iter().any(|r| r == name)
    }

    /// Runner names as a JSON array.
    pub fn runners_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.runners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_derive_names() {
        let set = RunnerSetInfo::derive("i-1234", 2);
        assert_eq!(set.runners, vec!["i-1234_runner_1", "i-1234_runner_2"]);
        assert_eq!(set.expected(), 2);
        assert!(set.contains("i-1234_runner_2"));
        assert!(!set.contains("i-1234_runner_3"));
    }

    #[test]
    fn test_names_are_distinct_for_any_count() {
        for count in 1..=16 {
            let set = RunnerSetInfo::derive("i-abc", count);
            let unique: HashSet<_> = set.runners.iter().collect();
            assert_eq!(unique.len(), count as usize);
            assert!(
                set.runners
                    .iter()
                    .all(|name| name.starts_with("i-abc_runner_"))
            );
        }
    }

    #[test]
    fn test_runners_json() {
        let set = RunnerSetInfo::derive("i-1", 2);
        assert_eq!(
            set.runners_json().unwrap(),
            r#"["i-1_runner_1","i-1_runner_2"]"#
        );
    }
}
