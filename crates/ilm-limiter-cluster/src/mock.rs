//! In-memory cluster for testing
//!
//! Simulates the lifecycle state of a cluster without a real Elasticsearch
//! node: policies, per-index steps, sizes and privileges are set up front and
//! every call is recorded for assertions.
//!
//! Transitions are checked against the stored step the same way the move API
//! does it, so a stale `current_step` is answered with
//! [`TransitionOutcome::PreconditionFailed`].
//!
//! # Examples
//!
//! ```rust
//! use ilm_limiter_cluster::mock::{raw_policy, MockClusterGateway, MockIndex};
//! use ilm_limiter_cluster::{ClusterGateway, TransitionOutcome};
//! use ilm_limiter_core::{LifecycleStep, Phase};
//!
//! # async fn example() -> ilm_limiter_core::CoreResult<()> {
//! let mock = MockClusterGateway::new()
//!     .with_policy("logs", raw_policy(&[Phase::Hot, Phase::Warm], &[("hot", "1kb")], &["logs-1"]))
//!     .with_index("logs-1", MockIndex::steady(Phase::Hot, 1_000, 2_048));
//!
//! let step = LifecycleStep::complete(Phase::Hot);
//! let outcome = mock.request_phase_transition("logs-1", &step, Phase::Warm).await?;
//! assert_eq!(outcome, TransitionOutcome::Applied);
//! assert_eq!(mock.transitions(), vec![("logs-1".to_string(), Phase::Warm)]);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ilm_limiter_core::{
    CoreError, CoreResult, IndexLifecycleState, LifecycleStep, Phase, RawPolicy, LIMITER_KEY,
};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::gateway::{ClusterGateway, TransitionOutcome};

/// Failure injected for a single index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// The cluster became unreachable. Fatal for the run.
    Connection,
    /// The cluster answered with the given status.
    Status(u16),
}

impl MockFailure {
    fn to_error(self, index: &str) -> CoreError {
        match self {
            MockFailure::Connection => CoreError::connection(format!("{}: connection refused", index)),
            MockFailure::Status(401) => CoreError::authentication(format!("/{}: expired", index)),
            MockFailure::Status(403) => CoreError::Forbidden {
                endpoint: format!("/{}", index),
                body: "injected failure".to_string(),
            },
            MockFailure::Status(status) => CoreError::Http {
                endpoint: format!("/{}", index),
                status,
                body: "injected failure".to_string(),
            },
        }
    }
}

/// Lifecycle state of a simulated index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockIndex {
    pub step: LifecycleStep,
    /// `None` makes explain omit `lifecycle_date_millis`.
    pub lifecycle_date: Option<DateTime<Utc>>,
    pub creation_date: DateTime<Utc>,
    pub size_bytes: u64,
}

impl MockIndex {
    /// An index that has completed `phase`, aged `lifecycle_millis`.
    pub fn steady(phase: Phase, lifecycle_millis: i64, size_bytes: u64) -> Self {
        Self::at_step(LifecycleStep::complete(phase), lifecycle_millis, size_bytes)
    }

    pub fn at_step(step: LifecycleStep, lifecycle_millis: i64, size_bytes: u64) -> Self {
        let date = DateTime::<Utc>::from_timestamp_millis(lifecycle_millis).unwrap_or_default();
        Self {
            step,
            lifecycle_date: Some(date),
            creation_date: date,
            size_bytes,
        }
    }

    /// Drops the lifecycle date so only the creation date is available.
    pub fn without_lifecycle_date(mut self) -> Self {
        self.lifecycle_date = None;
        self
    }
}

/// A recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    HasClusterPrivileges,
    HasIndexPrivileges(Vec<String>),
    ListPolicies,
    GetLifecycleState(String),
    GetCreationDate(String),
    GetDatasetSize(String),
    Transition {
        index: String,
        current_step: LifecycleStep,
        target: Phase,
    },
}

#[derive(Debug, Default)]
struct MockState {
    policies: BTreeMap<String, RawPolicy>,
    indices: HashMap<String, MockIndex>,
    cluster_privileges_denied: bool,
    index_privileges_denied: HashSet<String>,
    racing: HashSet<String>,
    failures: HashMap<String, MockFailure>,
    unreachable: bool,
    calls: Vec<MockCall>,
    applied: Vec<(String, Phase)>,
}

/// In-memory [`ClusterGateway`].
#[derive(Debug, Default)]
pub struct MockClusterGateway {
    state: RwLock<MockState>,
}

impl MockClusterGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(self, name: &str, policy: RawPolicy) -> Self {
        self.state.write().policies.insert(name.to_string(), policy);
        self
    }

    pub fn with_index(self, name: &str, index: MockIndex) -> Self {
        self.state.write().indices.insert(name.to_string(), index);
        self
    }

    /// Makes the cluster privilege check fail.
    pub fn deny_cluster_privileges(self) -> Self {
        self.state.write().cluster_privileges_denied = true;
        self
    }

    /// Makes any index privilege check including `index` fail.
    pub fn deny_index_privileges(self, index: &str) -> Self {
        self.state.write().index_privileges_denied.insert(index.to_string());
        self
    }

    /// Simulates the lifecycle engine moving `index` right before the limiter
    /// does: the next transition request for it is rejected.
    pub fn race_on_transition(self, index: &str) -> Self {
        self.state.write().racing.insert(index.to_string());
        self
    }

    /// Makes every request about `index` fail.
    pub fn fail_index(self, index: &str, failure: MockFailure) -> Self {
        self.state.write().failures.insert(index.to_string(), failure);
        self
    }

    /// Makes every request fail with a connection error.
    pub fn unreachable(self) -> Self {
        self.state.write().unreachable = true;
        self
    }

    /// All calls in the order they were made.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.read().calls.clone()
    }

    /// Transitions that were applied, in order.
    pub fn transitions(&self) -> Vec<(String, Phase)> {
        self.state.read().applied.clone()
    }

    /// Number of transition requests, applied or not.
    pub fn transition_requests(&self) -> usize {
        self.state
            .read()
            .calls
            .iter()
            .filter(|call| matches!(call, MockCall::Transition { .. }))
            .count()
    }

    /// Current step of a simulated index.
    pub fn index_step(&self, name: &str) -> Option<LifecycleStep> {
        self.state.read().indices.get(name).map(|index| index.step.clone())
    }

    fn record(&self, call: MockCall) -> CoreResult<()> {
        let mut state = self.state.write();
        state.calls.push(call);
        if state.unreachable {
            return Err(CoreError::connection("cluster unreachable"));
        }
        Ok(())
    }

    fn lookup(&self, index: &str) -> CoreResult<MockIndex> {
        let state = self.state.read();
        if let Some(failure) = state.failures.get(index) {
            return Err(failure.to_error(index));
        }
        state.indices.get(index).cloned().ok_or_else(|| CoreError::Http {
            endpoint: format!("/{}", index),
            status: 404,
            body: format!("no such index [{}]", index),
        })
    }
}

#[async_trait]
impl ClusterGateway for MockClusterGateway {
    async fn has_cluster_privileges(&self, _privileges: &[String]) -> CoreResult<bool> {
        self.record(MockCall::HasClusterPrivileges)?;
        Ok(!self.state.read().cluster_privileges_denied)
    }

    async fn has_index_privileges(
        &self,
        indices: &[String],
        _privileges: &[String],
    ) -> CoreResult<bool> {
        self.record(MockCall::HasIndexPrivileges(indices.to_vec()))?;
        let state = self.state.read();
        Ok(!indices
            .iter()
            .any(|index| state.index_privileges_denied.contains(index)))
    }

    async fn list_lifecycle_policies(&self) -> CoreResult<BTreeMap<String, RawPolicy>> {
        self.record(MockCall::ListPolicies)?;
        Ok(self.state.read().policies.clone())
    }

    async fn get_index_lifecycle_state(&self, index: &str) -> CoreResult<IndexLifecycleState> {
        self.record(MockCall::GetLifecycleState(index.to_string()))?;
        let found = self.lookup(index)?;
        Ok(IndexLifecycleState {
            step: found.step,
            lifecycle_date: found.lifecycle_date,
        })
    }

    async fn get_index_creation_date(&self, index: &str) -> CoreResult<DateTime<Utc>> {
        self.record(MockCall::GetCreationDate(index.to_string()))?;
        Ok(self.lookup(index)?.creation_date)
    }

    async fn get_index_dataset_size_bytes(&self, index: &str) -> CoreResult<u64> {
        self.record(MockCall::GetDatasetSize(index.to_string()))?;
        Ok(self.lookup(index)?.size_bytes)
    }

    async fn request_phase_transition(
        &self,
        index: &str,
        current_step: &LifecycleStep,
        target: Phase,
    ) -> CoreResult<TransitionOutcome> {
        self.record(MockCall::Transition {
            index: index.to_string(),
            current_step: current_step.clone(),
            target,
        })?;

        let mut guard = self.state.write();
        let state = &mut *guard;
        if let Some(failure) = state.failures.get(index) {
            return Err(failure.to_error(index));
        }
        if state.racing.contains(index) {
            return Ok(TransitionOutcome::PreconditionFailed(format!(
                "index [{}] is not on current step",
                index
            )));
        }

        match state.indices.get_mut(index) {
            Some(found) if found.step == *current_step => {
                found.step = LifecycleStep::complete(target);
                state.applied.push((index.to_string(), target));
                Ok(TransitionOutcome::Applied)
            }
            Some(found) => Ok(TransitionOutcome::PreconditionFailed(format!(
                "index [{}] is on step {}, not {}",
                index, found.step, current_step
            ))),
            None => Ok(TransitionOutcome::PreconditionFailed(format!(
                "index [{}] does not exist",
                index
            ))),
        }
    }
}

/// Builds a policy defining `phases`, limited by `limits` (phase name, size
/// string), governing `indices`.
pub fn raw_policy(phases: &[Phase], limits: &[(&str, &str)], indices: &[&str]) -> RawPolicy {
    let definitions: Map<String, Value> = phases
        .iter()
        .map(|phase| (phase.as_str().to_string(), json!({ "actions": {} })))
        .collect();
    let limiter: Map<String, Value> = limits
        .iter()
        .map(|(phase, size)| (phase.to_string(), json!({ "max_size": size })))
        .collect();

    RawPolicy {
        metadata: Some(json!({ LIMITER_KEY: { "phases": limiter } })),
        phases: Value::Object(definitions),
        indices: indices.iter().map(|index| index.to_string()).collect(),
    }
}
