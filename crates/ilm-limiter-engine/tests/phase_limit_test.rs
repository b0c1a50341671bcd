//! Enforcement passes against an in-memory cluster.
//!
//! Tests cover:
//! 1. Newest-first accounting and the exceed-not-reach threshold
//! 2. Dry-run mode
//! 3. Non-steady candidates and concurrent-move races
//! 4. Privilege failures (fatal vs. per policy)
//! 5. Phase ordering, successor resolution and the terminal phase
//! 6. Idempotence of consecutive passes
//! 7. Cooperative shutdown between policies

use ilm_limiter_cluster::mock::{raw_policy, MockCall, MockClusterGateway, MockFailure, MockIndex};
use ilm_limiter_core::{CoreError, LifecycleStep, Phase, RawPolicy, RunConfig};
use ilm_limiter_engine::{
    IndexAction, PhaseLimitEngine, PhaseOutcome, PolicyOutcome, PolicyReport, ReportingSink,
    RunReport, ShutdownFlag, TracingSink,
};
use parking_lot::Mutex;
use std::sync::Arc;

const KB: u64 = 1024;

/// Sink that remembers what it was told and can request shutdown after the
/// first policy.
#[derive(Default)]
struct RecordingSink {
    policies: Mutex<Vec<String>>,
    runs: Mutex<usize>,
    stop_after_first: Option<ShutdownFlag>,
}

impl ReportingSink for RecordingSink {
    fn policy_finished(&self, report: &PolicyReport) {
        self.policies.lock().push(report.name.clone());
        if let Some(flag) = &self.stop_after_first {
            flag.request();
        }
    }

    fn run_finished(&self, _report: &RunReport) {
        *self.runs.lock() += 1;
    }
}

fn engine(gateway: &Arc<MockClusterGateway>) -> PhaseLimitEngine {
    PhaseLimitEngine::new(gateway.clone(), Arc::new(TracingSink), ShutdownFlag::new())
}

/// Three 5kb indices in hot, newest `a`, limited to 8kb.
fn three_index_cluster() -> MockClusterGateway {
    MockClusterGateway::new()
        .with_policy(
            "logs",
            raw_policy(
                &[Phase::Hot, Phase::Warm, Phase::Delete],
                &[("hot", "8kb")],
                &["logs-c", "logs-a", "logs-b"],
            ),
        )
        .with_index("logs-a", MockIndex::steady(Phase::Hot, 3_000, 5 * KB))
        .with_index("logs-b", MockIndex::steady(Phase::Hot, 2_000, 5 * KB))
        .with_index("logs-c", MockIndex::steady(Phase::Hot, 1_000, 5 * KB))
}

fn actions(report: &RunReport) -> Vec<(String, IndexAction)> {
    report
        .decisions()
        .map(|d| (d.index.clone(), d.action.clone()))
        .collect()
}

#[tokio::test]
async fn test_oldest_indices_over_budget_are_advanced() {
    let gateway = Arc::new(three_index_cluster());

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    let decisions: Vec<_> = report.decisions().collect();
    let walk: Vec<_> = decisions.iter().map(|d| d.index.as_str()).collect();
    assert_eq!(walk, vec!["logs-a", "logs-b", "logs-c"]);
    let totals: Vec<_> = decisions.iter().map(|d| d.running_total).collect();
    assert_eq!(totals, vec![5 * KB, 10 * KB, 15 * KB]);

    assert_eq!(decisions[0].action, IndexAction::Retained);
    assert_eq!(decisions[1].action, IndexAction::Advanced);
    assert_eq!(decisions[2].action, IndexAction::Advanced);

    assert_eq!(
        gateway.transitions(),
        vec![
            ("logs-b".to_string(), Phase::Warm),
            ("logs-c".to_string(), Phase::Warm),
        ]
    );
    assert_eq!(report.advanced(), 2);
}

#[tokio::test]
async fn test_dry_run_issues_no_transitions() {
    let gateway = Arc::new(three_index_cluster());

    let report = engine(&gateway).run_limits(&RunConfig::new(true)).await.unwrap();

    assert_eq!(report.dry_run(), 2);
    assert_eq!(report.advanced(), 0);
    assert_eq!(gateway.transition_requests(), 0);
    assert_eq!(
        gateway.index_step("logs-c"),
        Some(LifecycleStep::complete(Phase::Hot))
    );
}

#[tokio::test]
async fn test_non_steady_candidate_is_left_alone() {
    let mid_rollover = LifecycleStep::new("hot", "rollover", "check-rollover-ready");
    let gateway = Arc::new(
        three_index_cluster()
            .with_index("logs-b", MockIndex::at_step(mid_rollover.clone(), 2_000, 5 * KB)),
    );

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    assert_eq!(
        actions(&report),
        vec![
            ("logs-a".to_string(), IndexAction::Retained),
            (
                "logs-b".to_string(),
                IndexAction::NonSteadyStep { step: mid_rollover }
            ),
            ("logs-c".to_string(), IndexAction::Advanced),
        ]
    );
    assert_eq!(gateway.transitions(), vec![("logs-c".to_string(), Phase::Warm)]);
}

#[tokio::test]
async fn test_concurrent_move_is_benign() {
    let gateway = Arc::new(
        three_index_cluster()
            .race_on_transition("logs-b")
            .with_policy(
                "metrics",
                raw_policy(&[Phase::Hot, Phase::Delete], &[("hot", "1kb")], &["metrics-1", "metrics-2"]),
            )
            .with_index("metrics-1", MockIndex::steady(Phase::Hot, 2_000, KB))
            .with_index("metrics-2", MockIndex::steady(Phase::Hot, 1_000, KB)),
    );

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    assert_eq!(report.raced(), 1);
    assert_eq!(report.failed_policies(), 0);
    assert_eq!(
        gateway.transitions(),
        vec![
            ("logs-c".to_string(), Phase::Warm),
            ("metrics-2".to_string(), Phase::Delete),
        ]
    );
}

#[tokio::test]
async fn test_unreadable_index_is_left_out() {
    let gateway = Arc::new(three_index_cluster().fail_index("logs-b", MockFailure::Status(500)));

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    let walk: Vec<_> = report.decisions().map(|d| d.index.clone()).collect();
    assert_eq!(walk, vec!["logs-a", "logs-c"]);
    assert_eq!(gateway.transitions(), vec![("logs-c".to_string(), Phase::Warm)]);
}

#[tokio::test]
async fn test_forbidden_index_does_not_abort_run() {
    let gateway = Arc::new(
        three_index_cluster()
            .fail_index("logs-b", MockFailure::Status(403))
            .with_policy(
                "metrics",
                raw_policy(&[Phase::Hot, Phase::Delete], &[("hot", "1kb")], &["metrics-1", "metrics-2"]),
            )
            .with_index("metrics-1", MockIndex::steady(Phase::Hot, 2_000, KB))
            .with_index("metrics-2", MockIndex::steady(Phase::Hot, 1_000, KB)),
    );

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    assert_eq!(report.failed_policies(), 0);
    assert_eq!(
        gateway.transitions(),
        vec![
            ("logs-c".to_string(), Phase::Warm),
            ("metrics-2".to_string(), Phase::Delete),
        ]
    );
}

#[tokio::test]
async fn test_missing_cluster_privileges_is_fatal() {
    let gateway = Arc::new(three_index_cluster().deny_cluster_privileges());

    let err = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap_err();

    assert!(matches!(err, CoreError::MissingClusterPrivilege { .. }));
    assert!(err.is_fatal());
    assert_eq!(gateway.calls(), vec![MockCall::HasClusterPrivileges]);
}

#[tokio::test]
async fn test_missing_index_privileges_skips_only_that_policy() {
    let gateway = Arc::new(
        three_index_cluster()
            .deny_index_privileges("logs-a")
            .with_policy(
                "metrics",
                raw_policy(&[Phase::Hot, Phase::Cold], &[("hot", "1kb")], &["metrics-1", "metrics-2"]),
            )
            .with_index("metrics-1", MockIndex::steady(Phase::Hot, 2_000, KB))
            .with_index("metrics-2", MockIndex::steady(Phase::Hot, 1_000, KB)),
    );

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    let logs = report.policy("logs").unwrap();
    assert!(matches!(
        logs.outcome,
        PolicyOutcome::Failed(CoreError::MissingIndexPrivilege { .. })
    ));
    assert_eq!(report.failed_policies(), 1);
    assert_eq!(gateway.transitions(), vec![("metrics-2".to_string(), Phase::Cold)]);
}

#[tokio::test]
async fn test_connection_loss_aborts_run() {
    let gateway = Arc::new(three_index_cluster().fail_index("logs-b", MockFailure::Connection));

    let err = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap_err();

    assert!(matches!(err, CoreError::Connection { .. }));
    assert_eq!(gateway.transition_requests(), 0);
}

#[tokio::test]
async fn test_unlimited_policies_are_not_checked() {
    let unlimited = RawPolicy {
        metadata: None,
        phases: serde_json::json!({"hot": {"actions": {}}, "delete": {"actions": {}}}),
        indices: vec!["other-1".to_string()],
    };
    let gateway = Arc::new(
        three_index_cluster()
            .with_policy("unlimited", unlimited)
            .with_index("other-1", MockIndex::steady(Phase::Hot, 5_000, 100 * KB)),
    );

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    let names: Vec<_> = report.policies.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["logs"]);
    assert!(!gateway
        .calls()
        .contains(&MockCall::GetLifecycleState("other-1".to_string())));
}

#[tokio::test]
async fn test_terminal_phase_is_never_enforced() {
    let gateway = Arc::new(
        MockClusterGateway::new()
            .with_policy(
                "logs",
                raw_policy(&[Phase::Hot, Phase::Delete], &[("delete", "1kb")], &["logs-1", "logs-2"]),
            )
            .with_index("logs-1", MockIndex::steady(Phase::Delete, 2_000, 10 * KB))
            .with_index("logs-2", MockIndex::steady(Phase::Delete, 1_000, 10 * KB)),
    );

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    let logs = report.policy("logs").unwrap();
    assert!(logs.phases().is_empty());
    assert_eq!(gateway.transition_requests(), 0);
    // Still counted in the configured totals.
    assert_eq!(report.limit_totals()[&Phase::Delete], KB);
}

#[tokio::test]
async fn test_dangling_limit_is_dropped() {
    let gateway = Arc::new(
        MockClusterGateway::new()
            .with_policy(
                "logs",
                raw_policy(
                    &[Phase::Hot, Phase::Warm, Phase::Delete],
                    &[("cold", "1kb"), ("warm", "1kb")],
                    &["logs-1", "logs-2"],
                ),
            )
            .with_index("logs-1", MockIndex::steady(Phase::Warm, 2_000, KB))
            .with_index("logs-2", MockIndex::steady(Phase::Warm, 1_000, KB)),
    );

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    let phases: Vec<_> = report.policy("logs").unwrap().phases().iter().map(|p| p.phase).collect();
    assert_eq!(phases, vec![Phase::Warm]);
    assert!(!report.limit_totals().contains_key(&Phase::Cold));
    assert_eq!(gateway.transitions(), vec![("logs-2".to_string(), Phase::Delete)]);
}

#[tokio::test]
async fn test_next_phase_skips_undefined_phases() {
    let gateway = Arc::new(
        MockClusterGateway::new()
            .with_policy(
                "logs",
                raw_policy(&[Phase::Hot, Phase::Frozen], &[("hot", "1kb")], &["logs-1", "logs-2"]),
            )
            .with_index("logs-1", MockIndex::steady(Phase::Hot, 2_000, KB))
            .with_index("logs-2", MockIndex::steady(Phase::Hot, 1_000, KB)),
    );

    engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    assert_eq!(gateway.transitions(), vec![("logs-2".to_string(), Phase::Frozen)]);
}

#[tokio::test]
async fn test_unreachable_successor_fails_only_that_phase() {
    let gateway = Arc::new(
        MockClusterGateway::new()
            .with_policy(
                "logs",
                raw_policy(
                    &[Phase::Hot, Phase::Warm],
                    &[("hot", "1kb"), ("warm", "1kb")],
                    &["hot-1", "hot-2", "warm-1", "warm-2"],
                ),
            )
            .with_index("hot-1", MockIndex::steady(Phase::Hot, 4_000, KB))
            .with_index("hot-2", MockIndex::steady(Phase::Hot, 3_000, KB))
            .with_index("warm-1", MockIndex::steady(Phase::Warm, 2_000, KB))
            .with_index("warm-2", MockIndex::steady(Phase::Warm, 1_000, KB)),
    );

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    let phases = report.policy("logs").unwrap().phases();
    assert_eq!(phases.len(), 2);
    assert_eq!(phases[0].phase, Phase::Warm);
    assert!(matches!(
        phases[0].outcome,
        PhaseOutcome::Failed(CoreError::UnreachableSuccessor { phase: Phase::Warm })
    ));
    assert_eq!(phases[1].phase, Phase::Hot);
    assert_eq!(report.failed_phases(), 1);
    assert_eq!(gateway.transitions(), vec![("hot-2".to_string(), Phase::Warm)]);
}

#[tokio::test]
async fn test_later_phase_checked_before_earlier_one() {
    // warm is limited to 1kb and already holds 1kb. Pushing hot-2 into warm
    // must not push anything out of warm within the same pass.
    let gateway = Arc::new(
        MockClusterGateway::new()
            .with_policy(
                "logs",
                raw_policy(
                    &[Phase::Hot, Phase::Warm, Phase::Delete],
                    &[("hot", "1kb"), ("warm", "1kb")],
                    &["hot-1", "hot-2", "warm-1"],
                ),
            )
            .with_index("hot-1", MockIndex::steady(Phase::Hot, 3_000, KB))
            .with_index("hot-2", MockIndex::steady(Phase::Hot, 2_000, KB))
            .with_index("warm-1", MockIndex::steady(Phase::Warm, 1_000, KB)),
    );

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    let order: Vec<_> = report.policy("logs").unwrap().phases().iter().map(|p| p.phase).collect();
    assert_eq!(order, vec![Phase::Warm, Phase::Hot]);
    assert_eq!(gateway.transitions(), vec![("hot-2".to_string(), Phase::Warm)]);
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let gateway = Arc::new(three_index_cluster());
    let engine = engine(&gateway);

    engine.run_limits(&RunConfig::default()).await.unwrap();
    assert_eq!(gateway.transition_requests(), 2);

    let second = engine.run_limits(&RunConfig::default()).await.unwrap();
    assert_eq!(gateway.transition_requests(), 2);
    assert_eq!(second.decisions().filter(|d| d.is_candidate()).count(), 0);
}

#[tokio::test]
async fn test_creation_date_used_without_lifecycle_date() {
    // logs-new has no lifecycle date but the newest creation date, so it is
    // counted first and the older logs-old is the one over budget.
    let gateway = Arc::new(
        MockClusterGateway::new()
            .with_policy(
                "logs",
                raw_policy(&[Phase::Hot, Phase::Warm], &[("hot", "1kb")], &["logs-old", "logs-new"]),
            )
            .with_index("logs-old", MockIndex::steady(Phase::Hot, 1_000, KB))
            .with_index(
                "logs-new",
                MockIndex::steady(Phase::Hot, 9_000, KB).without_lifecycle_date(),
            ),
    );

    engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    assert!(gateway
        .calls()
        .contains(&MockCall::GetCreationDate("logs-new".to_string())));
    assert!(!gateway
        .calls()
        .contains(&MockCall::GetCreationDate("logs-old".to_string())));
    assert_eq!(gateway.transitions(), vec![("logs-old".to_string(), Phase::Warm)]);
}

#[tokio::test]
async fn test_indices_outside_phase_order_are_ignored() {
    let fresh = LifecycleStep::new("new", "complete", "complete");
    let gateway = Arc::new(
        three_index_cluster().with_index("logs-a", MockIndex::at_step(fresh, 3_000, 5 * KB)),
    );

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    let walk: Vec<_> = report.decisions().map(|d| d.index.clone()).collect();
    assert_eq!(walk, vec!["logs-b", "logs-c"]);
    assert_eq!(gateway.transitions(), vec![("logs-c".to_string(), Phase::Warm)]);
}

#[tokio::test]
async fn test_limit_totals_across_policies() {
    let gateway = Arc::new(
        three_index_cluster().with_policy(
            "metrics",
            raw_policy(&[Phase::Hot, Phase::Warm], &[("hot", "2kb"), ("warm", "1mb")], &[]),
        ),
    );

    let report = engine(&gateway).run_limits(&RunConfig::default()).await.unwrap();

    let totals = report.limit_totals();
    assert_eq!(totals[&Phase::Hot], 10 * KB);
    assert_eq!(totals[&Phase::Warm], KB * KB);
}

#[tokio::test]
async fn test_shutdown_stops_between_policies() {
    let shutdown = ShutdownFlag::new();
    let sink = Arc::new(RecordingSink {
        stop_after_first: Some(shutdown.clone()),
        ..RecordingSink::default()
    });
    let gateway = Arc::new(
        three_index_cluster()
            .with_policy(
                "metrics",
                raw_policy(&[Phase::Hot, Phase::Delete], &[("hot", "1kb")], &["metrics-1", "metrics-2"]),
            )
            .with_index("metrics-1", MockIndex::steady(Phase::Hot, 2_000, KB))
            .with_index("metrics-2", MockIndex::steady(Phase::Hot, 1_000, KB)),
    );
    let engine = PhaseLimitEngine::new(gateway.clone(), sink.clone(), shutdown);

    let report = engine.run_limits(&RunConfig::default()).await.unwrap();

    // "logs" sorts first and completes in full; "metrics" is never started.
    assert!(matches!(report.policy("logs").unwrap().outcome, PolicyOutcome::Checked(_)));
    assert!(matches!(report.policy("metrics").unwrap().outcome, PolicyOutcome::Skipped));
    assert_eq!(gateway.transitions().len(), 2);
    assert!(!gateway
        .calls()
        .contains(&MockCall::GetLifecycleState("metrics-1".to_string())));

    assert!(report.interrupted());
    assert_eq!(*sink.policies.lock(), vec!["logs", "metrics"]);
    assert_eq!(*sink.runs.lock(), 1);
    // Skipped policies do not contribute to the totals.
    assert_eq!(report.limit_totals()[&Phase::Hot], 8 * KB);
}
