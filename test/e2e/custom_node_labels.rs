//! Custom tuning profile selected by a node label.
//!
//! Drives the full scenario against an in-memory cluster whose controller
//! applies a profile to nodes carrying the profile's label:
//!
//! 1. Select a worker and locate its agent
//! 2. Read the baseline `vm.nr_hugepages`
//! 3. Label the node and create the profile
//! 4. Wait for the profile value
//! 5. Delete the profile and wait for the baseline
//! 6. Roll back (delete profile, remove label) on every exit path
//!
//! ## Running
//!
//! ```bash
//! cargo test -p nodetune-e2e --test custom_node_labels
//! ```

use std::sync::Arc;
use std::time::Duration;

use nodetune_harness::{
    Agent, ClusterGateway, ConvergenceObserver, HarnessConfig, HarnessError, ManifestRef, Mutation,
    Node, PollSettings, ProfileLifecycleManager, RollbackStep, Scenario,
};
use nodetune_reconcile::Sample;
use nodetune_testing::{
    Call, FakeCluster, Op, HUGEPAGES_LABEL, HUGEPAGES_MANIFEST, HUGEPAGES_PARAMETER,
    OPERATOR_NAMESPACE,
};
use rstest::rstest;

const INTERVAL: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("nodetune_harness=debug")
        .with_test_writer()
        .try_init();
}

fn config() -> HarnessConfig {
    HarnessConfig {
        namespace: OPERATOR_NAMESPACE.to_string(),
        poll: PollSettings {
            interval: INTERVAL,
            convergence_budget: Duration::from_secs(60),
            restore_budget: Duration::from_secs(60),
        },
        ..HarnessConfig::default()
    }
}

fn scenario(cluster: &Arc<FakeCluster>, config: &HarnessConfig) -> Scenario {
    Scenario::new(config, cluster.clone(), cluster.clone())
}

fn manifest() -> ManifestRef {
    ManifestRef::new(HUGEPAGES_MANIFEST)
}

fn expected_rollback() -> Vec<RollbackStep> {
    vec![
        RollbackStep::DeleteProfile {
            manifest: manifest(),
        },
        RollbackStep::RemoveLabel {
            node: "worker-a".to_string(),
            key: HUGEPAGES_LABEL.to_string(),
        },
    ]
}

fn assert_label_cleared(cluster: &FakeCluster) {
    let labels = cluster.labels("worker-a").unwrap();
    assert!(
        !labels.contains_key(HUGEPAGES_LABEL),
        "label left on worker-a: {labels:?}"
    );
}

/// The last two mutating calls are the rollback, in order.
fn assert_rollback_tail(cluster: &FakeCluster) {
    let calls = cluster.mutation_calls();
    assert!(calls.len() >= 2, "calls: {calls:?}");
    assert_eq!(
        &calls[calls.len() - 2..],
        &[
            Call::DeleteResource {
                manifest: manifest()
            },
            Call::RemoveLabel {
                node: "worker-a".to_string(),
                key: HUGEPAGES_LABEL.to_string(),
            },
        ]
    );
    assert_eq!(cluster.count(Op::RemoveLabel), 1);
}

#[tokio::test(start_paused = true)]
async fn test_profile_applies_and_rolls_back() {
    init_tracing();

    let cluster = Arc::new(FakeCluster::hugepages());
    let report = scenario(&cluster, &config()).run().await;

    assert!(report.is_success(), "error: {:?}", report.error);
    assert_eq!(report.node.as_deref(), Some("worker-a"));
    assert_eq!(report.agent.as_deref(), Some("tuned-wa"));
    assert_eq!(report.baseline.as_deref(), Some("0"));
    assert_eq!(report.applied.as_deref(), Some("16"));
    assert_eq!(report.restored.as_deref(), Some("0"));

    let rollback = report.rollback.as_ref().unwrap();
    assert!(rollback.is_clean());
    assert_eq!(rollback.attempted, expected_rollback());

    assert_eq!(
        report.mutations,
        vec![
            Mutation::LabelSet {
                node: "worker-a".to_string(),
                key: HUGEPAGES_LABEL.to_string(),
            },
            Mutation::ProfileCreated {
                manifest: manifest()
            },
            Mutation::ProfileDeleted {
                manifest: manifest()
            },
            Mutation::LabelCleared {
                node: "worker-a".to_string(),
                key: HUGEPAGES_LABEL.to_string(),
            },
        ]
    );

    // Only the selected worker was touched.
    assert_eq!(
        cluster.labels("worker-b").unwrap().get(HUGEPAGES_LABEL),
        None
    );
    assert_label_cleared(&cluster);
    assert!(cluster.resources().is_empty());
    assert_eq!(
        cluster.value("worker-a", HUGEPAGES_PARAMETER).as_deref(),
        Some("0")
    );
    assert_rollback_tail(&cluster);

    let json = report.to_json();
    assert_eq!(json["success"], true);
    assert_eq!(json["mutations"][0]["kind"], "label_set");
}

#[rstest]
#[case::label_fails(
    FakeCluster::hugepages().failing(Op::SetLabel),
    |e: &HarnessError| matches!(e, HarnessError::LabelOperationFailed { .. }),
)]
#[case::create_fails(
    FakeCluster::hugepages().failing(Op::CreateResource),
    |e: &HarnessError| matches!(e, HarnessError::ProfileCreateFailed { .. }),
)]
#[case::never_converges(
    FakeCluster::hugepages().ignoring_profiles(),
    |e: &HarnessError| matches!(e, HarnessError::ConvergenceTimeout { expected, .. } if expected == "16"),
)]
#[case::delete_fails(
    FakeCluster::hugepages().failing(Op::DeleteResource),
    |e: &HarnessError| matches!(e, HarnessError::ProfileDeleteFailed { .. }),
)]
#[case::never_restores(
    FakeCluster::hugepages().never_restoring(),
    |e: &HarnessError| matches!(e, HarnessError::ConvergenceTimeout { expected, .. } if expected == "0"),
)]
#[tokio::test(start_paused = true)]
async fn test_rollback_runs_at_every_checkpoint(
    #[case] cluster: FakeCluster,
    #[case] expected: fn(&HarnessError) -> bool,
) {
    init_tracing();

    let cluster = Arc::new(cluster);
    let report = scenario(&cluster, &config()).run().await;

    let err = report.error.as_ref().unwrap();
    assert!(expected(err), "unexpected error: {err}");
    assert!(!report.is_success());

    let rollback = report.rollback.as_ref().unwrap();
    assert_eq!(rollback.attempted, expected_rollback());

    assert_rollback_tail(&cluster);
    assert_label_cleared(&cluster);
}

#[tokio::test(start_paused = true)]
async fn test_failed_rollback_step_does_not_stop_the_next() {
    init_tracing();

    let cluster = Arc::new(FakeCluster::hugepages().failing(Op::DeleteResource));
    let report = scenario(&cluster, &config()).run().await;

    let rollback = report.rollback.as_ref().unwrap();
    assert_eq!(rollback.failures.len(), 1);
    assert!(matches!(
        rollback.failures[0],
        HarnessError::ProfileDeleteFailed { .. }
    ));

    // The profile is stuck but the label still came off.
    assert_eq!(cluster.resources(), vec![manifest()]);
    assert_label_cleared(&cluster);

    // The forward error wins over the rollback failure.
    assert!(matches!(
        report.into_result(),
        Err(HarnessError::ProfileDeleteFailed { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_dirty_rollback_fails_a_passing_run() {
    init_tracing();

    let cluster = Arc::new(FakeCluster::hugepages().failing(Op::RemoveLabel));
    let report = scenario(&cluster, &config()).run().await;

    assert!(report.error.is_none());
    assert_eq!(report.restored.as_deref(), Some("0"));
    assert!(!report.is_success());

    match report.into_result() {
        Err(HarnessError::RollbackIncomplete { failures }) => {
            assert_eq!(failures.len(), 1);
            assert!(matches!(
                failures[0],
                HarnessError::LabelOperationFailed { .. }
            ));
        }
        other => panic!("expected RollbackIncomplete, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_rollback_runs_when_forward_panics() {
    init_tracing();

    let cluster = Arc::new(FakeCluster::hugepages().panicking(Op::CreateResource));
    let scenario = scenario(&cluster, &config());

    let handle = tokio::spawn(async move { scenario.run().await });
    let err = handle.await.unwrap_err();
    assert!(err.is_panic());

    assert_rollback_tail(&cluster);
    assert_label_cleared(&cluster);
    assert!(cluster.resources().is_empty());
}

#[rstest]
#[case::no_workers(
    FakeCluster::new()
        .with_node(Node::new("master-0").with_role("master"))
        .with_agent("master-0", "tuned-m0")
        .with_parameter(HUGEPAGES_PARAMETER, "0"),
    |e: &HarnessError| matches!(e, HarnessError::NoEligibleTarget { role } if role == "worker"),
)]
#[case::no_agent(
    FakeCluster::new()
        .with_node(Node::new("worker-a").with_role("worker"))
        .with_parameter(HUGEPAGES_PARAMETER, "0"),
    |e: &HarnessError| matches!(e, HarnessError::AgentNotFound { node } if node == "worker-a"),
)]
#[case::two_agents(
    FakeCluster::hugepages().with_agent("worker-a", "tuned-wa-2"),
    |e: &HarnessError| matches!(e, HarnessError::AmbiguousAgent { count: 2, .. }),
)]
#[case::inventory_fails(
    FakeCluster::hugepages().failing(Op::NodesByRole),
    |e: &HarnessError| matches!(e, HarnessError::InventoryQueryFailed { .. }),
)]
#[case::baseline_read_fails(
    FakeCluster::hugepages().failing(Op::ReadParameter),
    |e: &HarnessError| matches!(e, HarnessError::ReadError { .. }),
)]
#[tokio::test(start_paused = true)]
async fn test_setup_failure_touches_nothing(
    #[case] cluster: FakeCluster,
    #[case] expected: fn(&HarnessError) -> bool,
) {
    init_tracing();

    let cluster = Arc::new(cluster);
    let report = scenario(&cluster, &config()).run().await;

    let err = report.error.as_ref().unwrap();
    assert!(expected(err), "unexpected error: {err}");
    assert!(err.is_setup_error());

    assert!(report.rollback.is_none());
    assert!(report.mutations.is_empty());
    assert!(cluster.mutation_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_respects_budget() {
    init_tracing();

    let mut config = config();
    config.poll.convergence_budget = Duration::from_secs(12);

    let cluster = Arc::new(FakeCluster::hugepages().ignoring_profiles());
    let report = scenario(&cluster, &config).run().await;

    match report.error {
        Some(HarnessError::ConvergenceTimeout {
            budget,
            elapsed,
            last: Some(Sample::Value(last)),
            ..
        }) => {
            assert_eq!(budget, Duration::from_secs(12));
            assert!(elapsed >= budget, "gave up early: {elapsed:?}");
            assert!(elapsed < budget + INTERVAL, "overran: {elapsed:?}");
            assert_eq!(last, "0");
        }
        other => panic!("expected ConvergenceTimeout, got {other:?}"),
    }

    // Baseline read plus samples at 0s, 5s, 10s and the clipped 12s.
    assert_eq!(cluster.count(Op::ReadParameter), 5);
}

#[tokio::test(start_paused = true)]
async fn test_slow_controller_converges_within_budget() {
    init_tracing();

    let cluster = Arc::new(FakeCluster::hugepages().with_lag(3));
    let report = scenario(&cluster, &config()).run().await;

    assert!(report.is_success(), "error: {:?}", report.error);
    assert_eq!(report.applied.as_deref(), Some("16"));
    assert_eq!(report.restored.as_deref(), Some("0"));
    // Baseline, 4 reads to apply, 4 reads to restore.
    assert_eq!(cluster.count(Op::ReadParameter), 9);
}

#[tokio::test(start_paused = true)]
async fn test_read_errors_are_retried() {
    init_tracing();

    let cluster = Arc::new(FakeCluster::hugepages().with_transient_read_failures(2));
    cluster
        .set_node_label("worker-a", HUGEPAGES_LABEL, "")
        .await
        .unwrap();
    cluster
        .create_resource(OPERATOR_NAMESPACE, &manifest())
        .await
        .unwrap();

    let agent = Agent {
        name: "tuned-wa".to_string(),
        namespace: OPERATOR_NAMESPACE.to_string(),
        node: "worker-a".to_string(),
    };
    let observer = ConvergenceObserver::new(cluster.clone(), INTERVAL);
    let value = observer
        .await_value(&agent, HUGEPAGES_PARAMETER, "16", Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(value, "16");
    assert_eq!(cluster.count(Op::ReadParameter), 3);
}

#[tokio::test]
async fn test_label_apply_is_idempotent() {
    let cluster = Arc::new(FakeCluster::hugepages());
    let lifecycle = ProfileLifecycleManager::new(cluster.clone(), OPERATOR_NAMESPACE);

    lifecycle.apply_label("worker-a", HUGEPAGES_LABEL).await.unwrap();
    lifecycle.apply_label("worker-a", HUGEPAGES_LABEL).await.unwrap();

    let labels = cluster.labels("worker-a").unwrap();
    assert_eq!(labels.get(HUGEPAGES_LABEL).map(String::as_str), Some(""));
    assert_eq!(lifecycle.record().len(), 2);

    // A second clear finds nothing; only the real removal is recorded.
    lifecycle.remove_label("worker-a", HUGEPAGES_LABEL).await.unwrap();
    let err = lifecycle
        .remove_label("worker-a", HUGEPAGES_LABEL)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(lifecycle.record().len(), 3);
    assert_label_cleared(&cluster);
}

#[tokio::test]
async fn test_cleanup_recovers_interrupted_run() {
    init_tracing();

    let cluster = Arc::new(FakeCluster::hugepages());
    cluster
        .set_node_label("worker-a", HUGEPAGES_LABEL, "")
        .await
        .unwrap();
    cluster
        .create_resource(OPERATOR_NAMESPACE, &manifest())
        .await
        .unwrap();

    let scenario = scenario(&cluster, &config());
    let report = scenario.cleanup("worker-a").await;

    assert!(report.is_clean());
    assert_eq!(report.attempted, expected_rollback());
    assert!(cluster.resources().is_empty());
    assert_label_cleared(&cluster);

    // A second cleanup finds nothing and still succeeds.
    let again = scenario.cleanup("worker-a").await;
    assert!(again.is_clean());
    assert_eq!(again.attempted.len(), 2);
}
