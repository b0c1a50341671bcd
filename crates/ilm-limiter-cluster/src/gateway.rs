use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ilm_limiter_core::{CoreResult, IndexLifecycleState, LifecycleStep, Phase, RawPolicy};
use std::collections::BTreeMap;

/// Result of a phase-transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The cluster accepted the move.
    Applied,
    /// The index no longer sits at the step the request was based on, most
    /// likely because the lifecycle engine moved or deleted it meanwhile.
    PreconditionFailed(String),
}

/// Access to the cluster state the limiter reads and the one command it issues.
///
/// # Error Handling
///
/// - `CoreError::Connection` / `CoreError::Authentication` - transport or
///   credential failure, aborts the run
/// - `CoreError::Http` - unexpected status for a single request
/// - `CoreError::Deserialization` - the response had an unexpected shape
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Whether the acting principal holds all `privileges` cluster-wide.
    async fn has_cluster_privileges(&self, privileges: &[String]) -> CoreResult<bool>;

    /// Whether the acting principal holds all `privileges` on every index in
    /// `indices`.
    async fn has_index_privileges(
        &self,
        indices: &[String],
        privileges: &[String],
    ) -> CoreResult<bool>;

    /// All lifecycle policies keyed by name.
    async fn list_lifecycle_policies(&self) -> CoreResult<BTreeMap<String, RawPolicy>>;

    /// Current phase, action, step name and lifecycle date of an index.
    async fn get_index_lifecycle_state(&self, index: &str) -> CoreResult<IndexLifecycleState>;

    /// Creation date of an index.
    async fn get_index_creation_date(&self, index: &str) -> CoreResult<DateTime<Utc>>;

    /// Dataset size of an index summed over all shard copies.
    async fn get_index_dataset_size_bytes(&self, index: &str) -> CoreResult<u64>;

    /// Moves an index from `current_step` to the start of `target`.
    async fn request_phase_transition(
        &self,
        index: &str,
        current_step: &LifecycleStep,
        target: Phase,
    ) -> CoreResult<TransitionOutcome>;
}
