use ilm_limiter_cluster::{ClusterGateway, TransitionOutcome};
use ilm_limiter_core::config::{cluster_privileges, index_privileges};
use ilm_limiter_core::size::to_text;
use ilm_limiter_core::{
    limiter, CoreError, CoreResult, IndexPosition, IndexSnapshot, LifecyclePolicy, Phase,
    PhaseGroup, PhaseLimit, RunConfig,
};
use std::sync::Arc;

use crate::outcome::{
    IndexAction, IndexDecision, PhaseOutcome, PhaseReport, PolicyOutcome, PolicyReport, RunReport,
};
use crate::planner::plan_phase;
use crate::report::ReportingSink;
use crate::shutdown::ShutdownFlag;

/// Enforces per-phase size budgets of lifecycle policies.
///
/// Each pass works from live cluster state only: nothing is cached between
/// passes and every phase group is rebuilt from fresh queries.
///
/// Failures are contained at the narrowest scope they concern. A failing index
/// does not stop its phase, a failing phase does not stop its policy and a
/// failing policy does not stop the pass. Only errors for which
/// [`CoreError::is_fatal`] holds abort the pass.
pub struct PhaseLimitEngine {
    gateway: Arc<dyn ClusterGateway>,
    sink: Arc<dyn ReportingSink>,
    shutdown: ShutdownFlag,
}

impl PhaseLimitEngine {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        sink: Arc<dyn ReportingSink>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            gateway,
            sink,
            shutdown,
        }
    }

    /// Runs one enforcement pass over every limited policy.
    ///
    /// # Errors
    ///
    /// Returns an error only when the pass cannot continue: the cluster is
    /// unreachable, rejects the credentials, or the principal lacks the
    /// cluster privileges needed to move indices.
    pub async fn run_limits(&self, config: &RunConfig) -> CoreResult<RunReport> {
        let privileges = cluster_privileges();
        if !self.gateway.has_cluster_privileges(&privileges).await? {
            return Err(CoreError::MissingClusterPrivilege { privileges });
        }

        let policies = limiter::filter_policies(self.gateway.list_lifecycle_policies().await?);
        tracing::debug!(count = policies.len(), "limited lifecycles found");

        let mut report = RunReport::default();
        for policy in &policies {
            let outcome = if self.shutdown.is_requested() {
                PolicyOutcome::Skipped
            } else {
                match self.check_lifecycle(config, policy).await {
                    Ok(phases) => PolicyOutcome::Checked(phases),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::error!(policy = %policy.name, "{}", e);
                        PolicyOutcome::Failed(e)
                    }
                }
            };

            let policy_report = PolicyReport {
                name: policy.name.clone(),
                limits: configured_limits(policy),
                outcome,
            };
            self.sink.policy_finished(&policy_report);
            report.policies.push(policy_report);
        }

        self.sink.run_finished(&report);
        Ok(report)
    }

    /// Checks every limited phase of one policy, latest phase first.
    ///
    /// Working backwards means an index pushed out of an earlier phase lands in
    /// a phase that was already checked in this pass.
    pub async fn check_lifecycle(
        &self,
        config: &RunConfig,
        policy: &LifecyclePolicy,
    ) -> CoreResult<Vec<PhaseReport>> {
        tracing::info!("check lifecycle '{}'", policy.name);

        let privileges = index_privileges();
        if !self
            .gateway
            .has_index_privileges(&policy.indices, &privileges)
            .await?
        {
            return Err(CoreError::MissingIndexPrivilege {
                privileges,
                indices: policy.indices.clone(),
            });
        }

        let mut group = self.group_indices(&policy.indices).await?;

        if let Some(terminal) = policy
            .phases
            .iter()
            .find(|c| c.phase.is_terminal() && c.limit.is_some())
        {
            tracing::debug!(
                "lifecycle '{}', phase '{}' is terminal, its limit is ignored",
                policy.name,
                terminal.phase
            );
        }

        let mut reports = Vec::new();
        for phase_config in policy.enforceable_phases() {
            let phase = phase_config.phase;
            let Some(limit) = &phase_config.limit else {
                tracing::info!(
                    "lifecycle '{}', phase '{}' is not limited",
                    policy.name,
                    phase
                );
                continue;
            };

            let outcome = match policy.next_configured_phase(phase) {
                None => {
                    let e = CoreError::UnreachableSuccessor { phase };
                    tracing::error!(policy = %policy.name, "{}", e);
                    PhaseOutcome::Failed(e)
                }
                Some(next_phase) => {
                    tracing::info!(
                        "lifecycle '{}', phase '{}' is limited to {}, next phase: '{}'",
                        policy.name,
                        phase,
                        limit.max_size,
                        next_phase
                    );

                    let indices = group.take(phase);
                    match self
                        .check_phase(config, &policy.name, phase, next_phase, limit, indices)
                        .await
                    {
                        Ok(decisions) => PhaseOutcome::Checked {
                            next_phase,
                            decisions,
                        },
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            tracing::error!(policy = %policy.name, phase = %phase, "{}", e);
                            PhaseOutcome::Failed(e)
                        }
                    }
                }
            };

            reports.push(PhaseReport {
                phase,
                limit_bytes: limit.max_size_bytes,
                outcome,
            });
        }

        Ok(reports)
    }

    /// Walks the indices of one phase newest first and advances every index
    /// from the one that pushes the cumulative size over `limit`.
    ///
    /// # Errors
    ///
    /// Fails when the size of any index in the phase cannot be read, since the
    /// running total would be wrong. Rejected or failed moves of single indices
    /// are recorded in the returned decisions instead.
    pub async fn check_phase(
        &self,
        config: &RunConfig,
        policy_name: &str,
        phase: Phase,
        next_phase: Phase,
        limit: &PhaseLimit,
        indices: Vec<IndexPosition>,
    ) -> CoreResult<Vec<IndexDecision>> {
        let mut snapshots = Vec::with_capacity(indices.len());
        for position in indices {
            let size_bytes = self
                .gateway
                .get_index_dataset_size_bytes(&position.name)
                .await?;
            snapshots.push(IndexSnapshot::from_position(position, size_bytes));
        }

        let mut decisions = Vec::with_capacity(snapshots.len());
        for planned in plan_phase(limit.max_size_bytes, snapshots) {
            let index = planned.snapshot.name.as_str();

            tracing::info!(
                "lifecycle '{}', phase '{}', index '{}': usage={}, total={}, limit={}",
                policy_name,
                phase,
                index,
                to_text(planned.snapshot.size_bytes),
                to_text(planned.running_total),
                to_text(limit.max_size_bytes)
            );

            let action = if !planned.over_limit {
                IndexAction::Retained
            } else if !planned.snapshot.step.is_steady() {
                tracing::error!(
                    "lifecycle '{}', phase '{}', index '{}' cannot be moved as it is in a non-steady step: {}",
                    policy_name,
                    phase,
                    index,
                    planned.snapshot.step
                );
                IndexAction::NonSteadyStep {
                    step: planned.snapshot.step.clone(),
                }
            } else {
                tracing::info!(
                    "lifecycle '{}', phase '{}', index '{}' is moved to phase '{}'{}",
                    policy_name,
                    phase,
                    index,
                    next_phase,
                    config.log_suffix()
                );

                if config.dry_run {
                    IndexAction::DryRun
                } else {
                    self.advance(&planned.snapshot, next_phase).await?
                }
            };

            decisions.push(IndexDecision {
                index: planned.snapshot.name,
                size_bytes: planned.snapshot.size_bytes,
                running_total: planned.running_total,
                action,
            });
        }

        Ok(decisions)
    }

    /// Issues the move, conditioned on the step observed earlier.
    async fn advance(&self, snapshot: &IndexSnapshot, next_phase: Phase) -> CoreResult<IndexAction> {
        match self
            .gateway
            .request_phase_transition(&snapshot.name, &snapshot.step, next_phase)
            .await
        {
            Ok(TransitionOutcome::Applied) => Ok(IndexAction::Advanced),
            Ok(TransitionOutcome::PreconditionFailed(reason)) => {
                tracing::error!("index got moved or deleted: {}", reason);
                Ok(IndexAction::Raced { reason })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::error!(index = %snapshot.name, "failed to move index: {}", e);
                Ok(IndexAction::Failed {
                    error: e.to_string(),
                })
            }
        }
    }

    /// Reads the lifecycle position of every index and groups them by phase.
    ///
    /// Indices whose state cannot be read are left out of every group.
    async fn group_indices(&self, indices: &[String]) -> CoreResult<PhaseGroup> {
        let mut group = PhaseGroup::new();

        for index in indices {
            let position = match self.observe_index(index).await {
                Ok(position) => position,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(index = %index, "skipping index: {}", e);
                    continue;
                }
            };

            tracing::debug!("index '{}' current ilm step: {}", index, position.step);
            let phase = position.step.phase.clone();
            if !group.insert(position) {
                tracing::debug!("index '{}' is in untracked phase '{}'", index, phase);
            }
        }

        Ok(group)
    }

    async fn observe_index(&self, index: &str) -> CoreResult<IndexPosition> {
        let state = self.gateway.get_index_lifecycle_state(index).await?;
        let lifecycle_date = match state.lifecycle_date {
            Some(date) => date,
            None => self.gateway.get_index_creation_date(index).await?,
        };
        tracing::debug!(
            "index '{}' lifecycle date: {}",
            index,
            lifecycle_date.timestamp_millis()
        );

        Ok(IndexPosition {
            name: index.to_string(),
            step: state.step,
            lifecycle_date,
        })
    }
}

fn configured_limits(policy: &LifecyclePolicy) -> Vec<(Phase, u64)> {
    policy
        .phases
        .iter()
        .filter_map(|config| config.limit.as_ref().map(|l| (config.phase, l.max_size_bytes)))
        .collect()
}
