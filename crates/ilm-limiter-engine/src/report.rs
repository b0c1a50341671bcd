use ilm_limiter_core::size::to_text;

use crate::outcome::{PolicyOutcome, PolicyReport, RunReport};

/// Receives progress and the final summary of an enforcement pass.
pub trait ReportingSink: Send + Sync {
    /// Called once per policy, after it was checked, failed or skipped.
    fn policy_finished(&self, report: &PolicyReport);

    /// Called once at the end of a pass that was not aborted.
    fn run_finished(&self, report: &RunReport);
}

/// Sink writing human-readable lines through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportingSink for TracingSink {
    fn policy_finished(&self, report: &PolicyReport) {
        match &report.outcome {
            PolicyOutcome::Checked(phases) => {
                let candidates = report.decisions().filter(|d| d.is_candidate()).count();
                tracing::info!(
                    policy = %report.name,
                    phases = phases.len(),
                    candidates,
                    "lifecycle '{}' checked",
                    report.name
                );
            }
            PolicyOutcome::Failed(e) => {
                tracing::warn!(policy = %report.name, "lifecycle '{}' not checked: {}", report.name, e);
            }
            PolicyOutcome::Skipped => {
                tracing::warn!(
                    policy = %report.name,
                    "lifecycle '{}' skipped, shutdown requested",
                    report.name
                );
            }
        }
    }

    fn run_finished(&self, report: &RunReport) {
        for (phase, limit) in report.limit_totals() {
            tracing::info!(
                "sum of limits on all lifecycle phases '{}': {}",
                phase,
                to_text(limit)
            );
        }

        tracing::info!(
            policies = report.policies.len(),
            advanced = report.advanced(),
            dry_run = report.dry_run(),
            raced = report.raced(),
            non_steady = report.non_steady(),
            failed_transitions = report.failed_transitions(),
            failed_phases = report.failed_phases(),
            failed_policies = report.failed_policies(),
            "limiter run finished"
        );

        if report.interrupted() {
            tracing::warn!(
                skipped = report.skipped_policies(),
                "limiter run interrupted by shutdown request"
            );
        }
    }
}
