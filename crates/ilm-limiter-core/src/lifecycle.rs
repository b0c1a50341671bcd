use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::phase::Phase;

/// Action and step name the lifecycle engine uses for a finished phase.
const COMPLETE: &str = "complete";

/// Exact point of execution of an index inside its lifecycle.
///
/// Serializes to the `{phase, action, name}` object the move API expects as
/// `current_step`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleStep {
    pub phase: String,
    pub action: String,
    pub name: String,
}

impl LifecycleStep {
    pub fn new(
        phase: impl Into<String>,
        action: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            phase: phase.into(),
            action: action.into(),
            name: name.into(),
        }
    }

    /// The completed step of `phase`.
    pub fn complete(phase: Phase) -> Self {
        Self::new(phase.as_str(), COMPLETE, COMPLETE)
    }

    /// True when the phase's automation has finished and the index can be
    /// moved externally.
    #[must_use]
    pub fn is_steady(&self) -> bool {
        self.action == COMPLETE && self.name == COMPLETE
    }

    /// The observed phase, if it is part of the phase order.
    #[must_use]
    pub fn known_phase(&self) -> Option<Phase> {
        self.phase.parse().ok()
    }
}

impl std::fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.phase, self.action, self.name)
    }
}

/// Lifecycle position of an index as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLifecycleState {
    pub step: LifecycleStep,
    /// Rollover date, or creation date for indices that have not rolled over.
    /// Absent while the lifecycle engine has not initialised the index yet.
    pub lifecycle_date: Option<DateTime<Utc>>,
}

/// An index resident in a phase, with its lifecycle age.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPosition {
    pub name: String,
    pub step: LifecycleStep,
    pub lifecycle_date: DateTime<Utc>,
}

/// An index resident in a phase, with its age and dataset size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub name: String,
    pub step: LifecycleStep,
    pub lifecycle_date: DateTime<Utc>,
    /// Sum of the on-disk dataset size of all shard copies.
    pub size_bytes: u64,
}

impl IndexSnapshot {
    pub fn from_position(position: IndexPosition, size_bytes: u64) -> Self {
        Self {
            name: position.name,
            step: position.step,
            lifecycle_date: position.lifecycle_date,
            size_bytes,
        }
    }
}

/// Indices grouped by the phase they currently sit in.
#[derive(Debug, Clone, Default)]
pub struct PhaseGroup {
    groups: BTreeMap<Phase, Vec<IndexPosition>>,
}

impl PhaseGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an index to the group of its observed phase.
    ///
    /// Returns false, leaving the group untouched, when the phase is not part
    /// of the phase order.
    pub fn insert(&mut self, position: IndexPosition) -> bool {
        match position.step.known_phase() {
            Some(phase) => {
                self.groups.entry(phase).or_default().push(position);
                true
            }
            None => false,
        }
    }

    /// Indices resident in `phase`.
    pub fn indices(&self, phase: Phase) -> &[IndexPosition] {
        self.groups.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Removes and returns the indices resident in `phase`.
    pub fn take(&mut self, phase: Phase) -> Vec<IndexPosition> {
        self.groups.remove(&phase).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A size budget attached to a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseLimit {
    /// The configured size string, e.g. `"50gb"`.
    pub max_size: String,
    pub max_size_bytes: u64,
}

/// A phase defined by a policy, with its optional budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseConfig {
    pub phase: Phase,
    /// `None` means the phase is unlimited.
    pub limit: Option<PhaseLimit>,
}

/// Policy as listed by the cluster, before limiter extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPolicy {
    /// The policy's `_meta` object, if any.
    pub metadata: Option<serde_json::Value>,
    /// The policy's `phases` object.
    pub phases: serde_json::Value,
    /// Indices currently governed by the policy.
    pub indices: Vec<String>,
}

/// A lifecycle policy carrying at least one valid limiter section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub name: String,
    /// Phase definitions in phase order.
    pub phases: Vec<PhaseConfig>,
    /// Indices currently governed by the policy.
    pub indices: Vec<String>,
}

impl LifecyclePolicy {
    /// Builds a policy, ordering its phase definitions by phase order.
    pub fn new(name: impl Into<String>, mut phases: Vec<PhaseConfig>, indices: Vec<String>) -> Self {
        phases.sort_by_key(|config| config.phase);
        Self {
            name: name.into(),
            phases,
            indices,
        }
    }

    pub fn defines(&self, phase: Phase) -> bool {
        self.phases.iter().any(|config| config.phase == phase)
    }

    pub fn limit(&self, phase: Phase) -> Option<&PhaseLimit> {
        self.phases
            .iter()
            .find(|config| config.phase == phase)
            .and_then(|config| config.limit.as_ref())
    }

    /// Nearest later phase this policy defines, skipping gaps.
    pub fn next_configured_phase(&self, phase: Phase) -> Option<Phase> {
        phase.successors().find(|next| self.defines(*next))
    }

    /// Defined non-terminal phases, latest first.
    pub fn enforceable_phases(&self) -> impl Iterator<Item = &PhaseConfig> {
        self.phases
            .iter()
            .rev()
            .filter(|config| !config.phase.is_terminal())
    }
}
