//! Outcome values collected during an enforcement pass.

use ilm_limiter_core::{CoreError, LifecycleStep, Phase};
use std::collections::BTreeMap;

/// What happened to a single index during a phase check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexAction {
    /// Within budget, left where it is.
    Retained,
    /// Over budget and moved to the next phase.
    Advanced,
    /// Over budget, would have been moved outside dry-run mode.
    DryRun,
    /// Over budget, but the cluster rejected the move because the index was
    /// moved or deleted concurrently.
    Raced { reason: String },
    /// Over budget, but still mid-transition inside its phase.
    NonSteadyStep { step: LifecycleStep },
    /// Over budget, and the move request failed for another reason.
    Failed { error: String },
}

/// Per-index accounting line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDecision {
    pub index: String,
    pub size_bytes: u64,
    /// Cumulative phase size up to and including this index.
    pub running_total: u64,
    pub action: IndexAction,
}

impl IndexDecision {
    /// Whether the index contributed to exceeding the phase budget.
    #[must_use]
    pub fn is_candidate(&self) -> bool {
        self.action != IndexAction::Retained
    }
}

/// Result of enforcing the budget of one phase.
#[derive(Debug)]
pub enum PhaseOutcome {
    Checked {
        next_phase: Phase,
        decisions: Vec<IndexDecision>,
    },
    Failed(CoreError),
}

#[derive(Debug)]
pub struct PhaseReport {
    pub phase: Phase,
    pub limit_bytes: u64,
    pub outcome: PhaseOutcome,
}

impl PhaseReport {
    /// Accounting lines of a checked phase, empty otherwise.
    pub fn decisions(&self) -> &[IndexDecision] {
        match &self.outcome {
            PhaseOutcome::Checked { decisions, .. } => decisions,
            PhaseOutcome::Failed(_) => &[],
        }
    }
}

/// Result of checking one lifecycle policy.
#[derive(Debug)]
pub enum PolicyOutcome {
    Checked(Vec<PhaseReport>),
    Failed(CoreError),
    /// Not attempted because shutdown was requested.
    Skipped,
}

#[derive(Debug)]
pub struct PolicyReport {
    pub name: String,
    /// Configured budgets, in phase order, terminal phase included.
    pub limits: Vec<(Phase, u64)>,
    pub outcome: PolicyOutcome,
}

impl PolicyReport {
    /// Phase reports of a checked policy, empty otherwise.
    pub fn phases(&self) -> &[PhaseReport] {
        match &self.outcome {
            PolicyOutcome::Checked(phases) => phases,
            _ => &[],
        }
    }

    pub fn decisions(&self) -> impl Iterator<Item = &IndexDecision> {
        self.phases().iter().flat_map(|phase| phase.decisions())
    }
}

/// Aggregate of a full enforcement pass.
#[derive(Debug, Default)]
pub struct RunReport {
    pub policies: Vec<PolicyReport>,
}

impl RunReport {
    pub fn policy(&self, name: &str) -> Option<&PolicyReport> {
        self.policies.iter().find(|policy| policy.name == name)
    }

    /// Sum of configured budgets per phase over every attempted policy.
    pub fn limit_totals(&self) -> BTreeMap<Phase, u64> {
        let mut totals = BTreeMap::new();
        for policy in &self.policies {
            if matches!(policy.outcome, PolicyOutcome::Skipped) {
                continue;
            }
            for (phase, limit) in &policy.limits {
                let total = totals.entry(*phase).or_insert(0u64);
                *total = total.saturating_add(*limit);
            }
        }
        totals
    }

    pub fn decisions(&self) -> impl Iterator<Item = &IndexDecision> {
        self.policies.iter().flat_map(|policy| policy.decisions())
    }

    fn count(&self, matches: impl Fn(&IndexAction) -> bool) -> usize {
        self.decisions().filter(|d| matches(&d.action)).count()
    }

    /// Indices actually moved to their next phase.
    pub fn advanced(&self) -> usize {
        self.count(|a| matches!(a, IndexAction::Advanced))
    }

    /// Moves decided but not issued because of dry-run mode.
    pub fn dry_run(&self) -> usize {
        self.count(|a| matches!(a, IndexAction::DryRun))
    }

    pub fn raced(&self) -> usize {
        self.count(|a| matches!(a, IndexAction::Raced { .. }))
    }

    pub fn non_steady(&self) -> usize {
        self.count(|a| matches!(a, IndexAction::NonSteadyStep { .. }))
    }

    pub fn failed_transitions(&self) -> usize {
        self.count(|a| matches!(a, IndexAction::Failed { .. }))
    }

    pub fn failed_policies(&self) -> usize {
        self.policies
            .iter()
            .filter(|p| matches!(p.outcome, PolicyOutcome::Failed(_)))
            .count()
    }

    pub fn failed_phases(&self) -> usize {
        self.policies
            .iter()
            .flat_map(|policy| policy.phases())
            .filter(|p| matches!(p.outcome, PhaseOutcome::Failed(_)))
            .count()
    }

    pub fn skipped_policies(&self) -> usize {
        self.policies
            .iter()
            .filter(|p| matches!(p.outcome, PolicyOutcome::Skipped))
            .count()
    }

    /// Whether shutdown cut the pass short.
    pub fn interrupted(&self) -> bool {
        self.skipped_policies() > 0
    }
}
