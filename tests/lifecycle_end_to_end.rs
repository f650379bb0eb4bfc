mod common;

use async_trait::async_trait;
use common::{id, ids, Harness};
use feature_lifecycle::events::{BroadcastEvent, EventKind, EventSubscriber, Subscription};
use feature_lifecycle::models::{AuditAction, FeatureConfig, FeatureStatus, ResourceBindings};
use feature_lifecycle::orchestration::{BulkStrategy, OperationOptions, OperationOutcome};
use feature_lifecycle::recovery::ErrorCategory;
use feature_lifecycle::state_machine::{LifecycleStage, OperationKind, OperationStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// `a` requires `b`, nothing bound
async fn pair() -> Harness {
    let harness = Harness::new().await;
    harness.register(FeatureConfig::new("b")).await;
    harness.register(FeatureConfig::new("a").requires("b")).await;
    harness
}

fn executed(outcome: &OperationOutcome) -> &feature_lifecycle::LifecycleOperation {
    outcome.operation().expect("operation should have run")
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<BroadcastEvent>>,
}

impl Recorder {
    fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|event| event.kind).collect()
    }
}

#[async_trait]
impl EventSubscriber for Recorder {
    async fn on_event(&self, event: &BroadcastEvent) -> anyhow::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_enable_with_dependencies_enables_requirement_first() {
    let harness = pair().await;

    let result = harness
        .context
        .enable_features(&ids(&["a"]), true, BulkStrategy::Sequential, &OperationOptions::new())
        .await;

    assert!(result.success, "{:?}", result.failures);
    assert_eq!(result.resolution.order, ids(&["b", "a"]));
    assert_eq!(result.succeeded_features(), ids(&["b", "a"]));
    assert_eq!(harness.context.feature_status(&id("a")).await.unwrap(), FeatureStatus::Enabled);
    assert_eq!(harness.context.feature_status(&id("b")).await.unwrap(), FeatureStatus::Enabled);

    let enables = harness
        .store
        .audit_entries()
        .into_iter()
        .filter(|entry| entry.action == AuditAction::Enable)
        .count();
    assert_eq!(enables, 2);
}

#[tokio::test]
async fn test_enable_fails_preparation_when_requirement_disabled() {
    let harness = pair().await;

    let outcome = harness
        .context
        .enable_feature(&id("a"), &OperationOptions::new())
        .await
        .unwrap();
    let op = executed(&outcome);

    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.stages_failed, vec![LifecycleStage::Preparation]);
    assert_eq!(op.error_category, Some(ErrorCategory::Configuration));
    assert!(op.error_message.as_deref().unwrap().contains("b"));
    assert_eq!(harness.context.feature_status(&id("a")).await.unwrap(), FeatureStatus::Disabled);
}

#[tokio::test]
async fn test_validation_reports_inconsistent_states() {
    let harness = pair().await;
    harness
        .context
        .enable_features(&ids(&["a"]), true, BulkStrategy::Sequential, &OperationOptions::new())
        .await;

    // Disabling b alone leaves its dependent running
    let outcome = harness
        .context
        .disable_feature(&id("b"), &OperationOptions::new())
        .await
        .unwrap();
    assert!(outcome.is_success());

    let validation = harness.context.validate_feature_state(&id("b")).await.unwrap();
    assert!(!validation.valid);
    assert_eq!(
        validation.warnings,
        vec!["dependent a is enabled while b is disabled".to_string()]
    );

    let validation = harness.context.validate_feature_state(&id("a")).await.unwrap();
    assert_eq!(
        validation.warnings,
        vec!["required dependency b is disabled while a is enabled".to_string()]
    );
}

#[tokio::test]
async fn test_cascade_disable_unwinds_dependents_first() {
    let harness = pair().await;
    harness
        .context
        .enable_features(&ids(&["a"]), true, BulkStrategy::Sequential, &OperationOptions::new())
        .await;

    let result = harness
        .context
        .disable_features(&ids(&["b"]), true, BulkStrategy::Sequential, &OperationOptions::new())
        .await;

    assert!(result.success);
    assert_eq!(result.resolution.order, ids(&["a", "b"]));
    for feature in ["a", "b"] {
        assert_eq!(
            harness.context.feature_status(&id(feature)).await.unwrap(),
            FeatureStatus::Disabled
        );
    }
    assert!(harness.context.validate_feature_state(&id("b")).await.unwrap().valid);
}

#[tokio::test]
async fn test_impact_counts_dependents_and_conflicts() {
    let harness = pair().await;
    harness
        .register(FeatureConfig::new("c").conflicts_with("b"))
        .await;

    let impact = harness.context.get_feature_impact(&id("b")).await.unwrap();
    assert_eq!(impact.dependents.len(), 1);
    assert_eq!(impact.dependents[0].feature_id, id("a"));
    assert_eq!(impact.conflicts.len(), 1);
    assert_eq!(impact.impact_score, 2 + 3);
}

#[tokio::test]
async fn test_disable_of_disabled_feature_is_a_no_op() {
    let harness = Harness::new().await;
    harness
        .register_with(
            FeatureConfig::new("idle"),
            ResourceBindings::new().with_services(["svc-1"]),
        )
        .await;

    let outcome = harness
        .context
        .disable_feature(&id("idle"), &OperationOptions::new())
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        OperationOutcome::Unchanged {
            status: FeatureStatus::Disabled,
            ..
        }
    ));
    assert!(outcome.is_success());
    assert!(harness.services.stop_calls().is_empty());
    assert!(harness.context.orchestrator().operation_history(None).is_empty());
}

#[tokio::test]
async fn test_unknown_feature_is_rejected() {
    let harness = Harness::new().await;
    let err = harness
        .context
        .disable_feature(&id("ghost"), &OperationOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Feature not found: ghost");
}

#[tokio::test]
async fn test_successful_disable_stops_everything_and_cleans_up() {
    let harness = Harness::new().await;
    harness
        .register_with(
            FeatureConfig::new("momentum"),
            ResourceBindings::new()
                .with_tasks(["t1"])
                .with_agents(["a1", "a2"])
                .with_services(["s1"]),
        )
        .await;
    harness
        .context
        .enable_feature(&id("momentum"), &OperationOptions::new())
        .await
        .unwrap();

    let scratch = harness.context.cleanup().feature_temp_dir(&id("momentum"));
    tokio::fs::create_dir_all(&scratch).await.unwrap();
    tokio::fs::write(scratch.join("state.bin"), b"cached").await.unwrap();

    let outcome = harness
        .context
        .disable_feature(&id("momentum"), &OperationOptions::new().with_reason("rebalancing"))
        .await
        .unwrap();
    let op = executed(&outcome);

    assert_eq!(op.status, OperationStatus::Completed);
    assert_eq!(op.stages_completed, LifecycleStage::DEACTIVATION.to_vec());
    assert!(op.rollback_data.is_none());
    assert_eq!(harness.tasks.stop_calls(), vec![vec!["t1".to_string()]]);
    assert_eq!(
        harness.agents.stop_calls(),
        vec![vec!["a1".to_string(), "a2".to_string()]]
    );
    assert!(!scratch.exists());
    assert!(op.cleanup_report.as_ref().unwrap().success);
    assert_eq!(
        harness.context.feature_status(&id("momentum")).await.unwrap(),
        FeatureStatus::Disabled
    );

    let disable = harness
        .store
        .audit_entries()
        .into_iter()
        .find(|entry| entry.action == AuditAction::Disable)
        .unwrap();
    assert_eq!(disable.reason.as_deref(), Some("rebalancing"));
}

#[tokio::test]
async fn test_service_stop_failure_fails_operation_and_rolls_back() {
    let harness = Harness::new().await;
    harness
        .register_with(
            FeatureConfig::new("arbitrage"),
            ResourceBindings::new()
                .with_tasks(["t1"])
                .with_agents(["a1"])
                .with_services(["s1", "s2"]),
        )
        .await;
    harness
        .context
        .enable_feature(&id("arbitrage"), &OperationOptions::new())
        .await
        .unwrap();
    harness.services.refuse("s2");

    let outcome = harness
        .context
        .disable_feature(&id("arbitrage"), &OperationOptions::new())
        .await
        .unwrap();
    let op = executed(&outcome);

    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(
        op.stages_completed,
        vec![
            LifecycleStage::Preparation,
            LifecycleStage::StoppingTasks,
            LifecycleStage::StoppingAgents,
        ]
    );
    assert_eq!(op.stages_failed, vec![LifecycleStage::StoppingServices]);
    assert_eq!(op.error_category, Some(ErrorCategory::Service));

    // One in-place retry targeted only the service still running
    let services = &op.stage_outcomes[&LifecycleStage::StoppingServices];
    assert_eq!(services.attempts, 2);
    assert_eq!(services.failed, vec!["s2".to_string()]);
    assert_eq!(
        harness.services.stop_calls(),
        vec![
            vec!["s1".to_string(), "s2".to_string()],
            vec!["s2".to_string()]
        ]
    );

    assert!(op.rolled_back);
    assert_eq!(harness.services.restart_calls(), vec![vec!["s1".to_string()]]);
    assert_eq!(harness.agents.restart_calls(), vec![vec!["a1".to_string()]]);
    assert_eq!(harness.tasks.restart_calls(), vec![vec!["t1".to_string()]]);
    assert!(harness.services.is_running("s1"));

    // Restored, so the feature keeps its previous state
    assert_eq!(
        harness.context.feature_status(&id("arbitrage")).await.unwrap(),
        FeatureStatus::Enabled
    );
}

/// `scalper` with one task, agent and service; services take longer than the
/// whole-operation deadline
async fn slow_services() -> Harness {
    let harness = Harness::with_config(|config| {
        config.orchestrator.operation_timeout_ms = 50;
    })
    .await;
    harness
        .register_with(
            FeatureConfig::new("scalper"),
            ResourceBindings::new()
                .with_tasks(["t1"])
                .with_agents(["a1"])
                .with_services(["s1"]),
        )
        .await;
    harness
        .context
        .enable_feature(&id("scalper"), &OperationOptions::new())
        .await
        .unwrap();
    harness.services.set_delay(Duration::from_millis(300));
    harness
}

#[tokio::test]
async fn test_operation_deadline_fails_and_rolls_back() {
    let harness = slow_services().await;

    let outcome = harness
        .context
        .disable_feature(&id("scalper"), &OperationOptions::new())
        .await
        .unwrap();
    let op = executed(&outcome);

    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.stages_failed, vec![LifecycleStage::StoppingServices]);
    assert_eq!(op.error_category, Some(ErrorCategory::Timeout));
    assert!(op.rolled_back);
    assert_eq!(harness.tasks.restart_calls(), vec![vec!["t1".to_string()]]);
    assert_eq!(harness.agents.restart_calls(), vec![vec!["a1".to_string()]]);
    assert!(harness.services.restart_calls().is_empty());
    assert!(harness.tasks.is_running("t1"));
    assert_eq!(harness.context.orchestrator().active_count(), 0);
    assert_eq!(
        harness.context.feature_status(&id("scalper")).await.unwrap(),
        FeatureStatus::Enabled
    );
}

#[tokio::test]
async fn test_operation_deadline_without_rollback_persists_failed_state() {
    let harness = slow_services().await;

    let outcome = harness
        .context
        .disable_feature(&id("scalper"), &OperationOptions::new().without_rollback())
        .await
        .unwrap();
    let op = executed(&outcome);

    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.error_category, Some(ErrorCategory::Timeout));
    assert!(!op.rolled_back);
    assert!(harness.tasks.restart_calls().is_empty());
    assert!(!harness.tasks.is_running("t1"));
    assert_eq!(harness.context.orchestrator().active_count(), 0);
    assert_eq!(
        harness.context.feature_status(&id("scalper")).await.unwrap(),
        FeatureStatus::Failed
    );
}

#[tokio::test]
async fn test_rollback_only_touches_kinds_in_snapshot() {
    let harness = Harness::new().await;
    harness
        .register_with(
            FeatureConfig::new("scanner"),
            ResourceBindings::new().with_tasks(["t1"]).with_services(["s1"]),
        )
        .await;
    harness
        .context
        .enable_feature(&id("scanner"), &OperationOptions::new())
        .await
        .unwrap();
    harness.services.refuse("s1");

    let outcome = harness
        .context
        .disable_feature(&id("scanner"), &OperationOptions::new())
        .await
        .unwrap();

    assert!(executed(&outcome).rolled_back);
    assert_eq!(harness.tasks.restart_calls(), vec![vec!["t1".to_string()]]);
    assert!(harness.agents.restart_calls().is_empty());
    assert!(harness.services.restart_calls().is_empty());
}

#[tokio::test]
async fn test_transient_stop_error_recovers_with_retry() {
    let harness = Harness::new().await;
    harness
        .register_with(
            FeatureConfig::new("hedger"),
            ResourceBindings::new().with_services(["s1"]),
        )
        .await;
    harness
        .context
        .enable_feature(&id("hedger"), &OperationOptions::new())
        .await
        .unwrap();
    harness.services.fail_next("service unavailable");

    let outcome = harness
        .context
        .disable_feature(&id("hedger"), &OperationOptions::new())
        .await
        .unwrap();
    let op = executed(&outcome);

    assert_eq!(op.status, OperationStatus::Completed);
    assert!(op.recovery_session_id.is_some());
    assert_eq!(harness.services.stop_calls().len(), 2);
    let stats = harness.context.recovery().statistics();
    assert_eq!(stats.successful_recoveries, 1);
    // Retry bookkeeping is cleared once the operation ends
    assert_eq!(
        harness
            .context
            .recovery()
            .retry_count(&id("hedger"), Some(LifecycleStage::StoppingServices)),
        0
    );
}

#[tokio::test]
async fn test_failed_rollback_leaves_partial_and_failed_state() {
    let harness = Harness::new().await;
    harness
        .register_with(
            FeatureConfig::new("grid"),
            ResourceBindings::new().with_tasks(["t1"]).with_services(["s1"]),
        )
        .await;
    harness
        .context
        .enable_feature(&id("grid"), &OperationOptions::new())
        .await
        .unwrap();
    harness.services.refuse("s1");
    harness.tasks.fail_restarts(true);

    let outcome = harness
        .context
        .disable_feature(&id("grid"), &OperationOptions::new())
        .await
        .unwrap();
    let op = executed(&outcome);

    assert_eq!(op.status, OperationStatus::Partial);
    assert!(!op.rolled_back);
    assert!(op.error_message.as_deref().unwrap().contains("rollback failed"));
    assert_eq!(
        harness.context.feature_status(&id("grid")).await.unwrap(),
        FeatureStatus::Failed
    );
}

#[tokio::test]
async fn test_failure_without_rollback_persists_failed_state() {
    let harness = Harness::new().await;
    harness
        .register_with(
            FeatureConfig::new("grid"),
            ResourceBindings::new().with_tasks(["t1"]).with_services(["s1"]),
        )
        .await;
    harness
        .context
        .enable_feature(&id("grid"), &OperationOptions::new())
        .await
        .unwrap();
    harness.services.refuse("s1");

    let outcome = harness
        .context
        .disable_feature(&id("grid"), &OperationOptions::new().without_rollback())
        .await
        .unwrap();

    assert_eq!(executed(&outcome).status, OperationStatus::Failed);
    assert!(harness.tasks.restart_calls().is_empty());
    assert!(!harness.tasks.is_running("t1"));
    assert_eq!(
        harness.context.feature_status(&id("grid")).await.unwrap(),
        FeatureStatus::Failed
    );
}

#[tokio::test]
async fn test_resource_error_forces_rollback() {
    let harness = Harness::new().await;
    harness
        .register_with(
            FeatureConfig::new("ml_signals"),
            ResourceBindings::new().with_tasks(["t1"]).with_services(["s1"]),
        )
        .await;
    harness
        .context
        .enable_feature(&id("ml_signals"), &OperationOptions::new())
        .await
        .unwrap();
    harness.services.fail_next("out of memory while draining");

    let outcome = harness
        .context
        .disable_feature(&id("ml_signals"), &OperationOptions::new().without_rollback())
        .await
        .unwrap();
    let op = executed(&outcome);

    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.error_category, Some(ErrorCategory::Resource));
    assert!(op.rolled_back);
    assert_eq!(harness.tasks.restart_calls(), vec![vec!["t1".to_string()]]);
}

#[tokio::test]
async fn test_missing_stopper_fails_stage() {
    let temp = tempfile::TempDir::new().unwrap();
    let context = feature_lifecycle::LifecycleContext::builder()
        .with_config(common::fast_config(temp.path()))
        .build()
        .await
        .unwrap();
    context
        .register_feature_with_bindings(
            FeatureConfig::new("orphan"),
            ResourceBindings::new().with_agents(["a1"]),
        )
        .await
        .unwrap();
    context
        .enable_feature(&id("orphan"), &OperationOptions::new())
        .await
        .unwrap();

    let outcome = context
        .disable_feature(&id("orphan"), &OperationOptions::new())
        .await
        .unwrap();
    let op = executed(&outcome);

    assert_eq!(op.stages_failed, vec![LifecycleStage::StoppingAgents]);
    assert_eq!(op.error_category, Some(ErrorCategory::Configuration));
    assert!(op.error_message.as_deref().unwrap().contains("no stopper"));
}

#[tokio::test]
async fn test_same_kind_request_joins_and_opposite_kind_waits() {
    let harness = Harness::new().await;
    harness
        .register_with(
            FeatureConfig::new("scanner"),
            ResourceBindings::new().with_services(["s1"]),
        )
        .await;
    harness
        .context
        .enable_feature(&id("scanner"), &OperationOptions::new())
        .await
        .unwrap();
    harness.services.set_delay(Duration::from_millis(200));

    let context = Arc::clone(&harness.context);
    let first = tokio::spawn(async move {
        context
            .disable_feature(&id("scanner"), &OperationOptions::new())
            .await
    });

    for _ in 0..100 {
        if harness.context.orchestrator().active_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let in_flight = harness
        .context
        .orchestrator()
        .active_operation(&id("scanner"))
        .expect("disable should be in flight");
    assert_eq!(in_flight.kind, OperationKind::Disable);

    // A second disable joins; an enable waits and then runs on its own
    let scanner = id("scanner");
    let options = OperationOptions::new();
    let (second, third) = tokio::join!(
        harness.context.disable_feature(&scanner, &options),
        harness.context.enable_feature(&scanner, &options),
    );
    let first = first.await.unwrap().unwrap();
    let second = second.unwrap();
    let third = third.unwrap();

    let op_id = executed(&first).id;
    assert_eq!(executed(&second).id, op_id);
    assert_eq!(executed(&first).status, OperationStatus::Completed);
    assert_ne!(executed(&third).id, op_id);
    assert_eq!(executed(&third).kind, OperationKind::Enable);
    assert!(third.is_success());
    assert_eq!(harness.services.stop_calls().len(), 1);
    assert_eq!(
        harness.context.feature_status(&scanner).await.unwrap(),
        FeatureStatus::Enabled
    );
    assert_eq!(harness.context.orchestrator().active_count(), 0);
    assert_eq!(harness.context.orchestrator().operation_history(None).len(), 3);
}

async fn three_features() -> Harness {
    let harness = Harness::new().await;
    for name in ["x", "y", "z"] {
        harness
            .register_with(
                FeatureConfig::new(name),
                ResourceBindings::new()
                    .with_tasks([format!("t-{name}")])
                    .with_services([format!("s-{name}")]),
            )
            .await;
    }
    let result = harness
        .context
        .enable_features(&ids(&["x", "y", "z"]), false, BulkStrategy::BestEffort, &OperationOptions::new())
        .await;
    assert!(result.success);
    harness.services.refuse("s-y");
    harness
}

#[tokio::test]
async fn test_sequential_bulk_stops_at_first_failure() {
    let harness = three_features().await;

    let result = harness
        .context
        .disable_features(
            &ids(&["x", "y", "z"]),
            false,
            BulkStrategy::Sequential,
            &OperationOptions::new().without_rollback(),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].feature_id, id("y"));
    let position = result
        .resolution
        .order
        .iter()
        .position(|feature| feature == &id("y"))
        .unwrap();
    assert_eq!(result.skipped, result.resolution.order[position + 1..].to_vec());
    assert_eq!(result.outcomes.len(), position + 1);
    // Rollback was not requested
    assert!(harness.tasks.restart_calls().is_empty());
}

#[tokio::test]
async fn test_atomic_bulk_rolls_back_failing_feature() {
    let harness = three_features().await;

    let result = harness
        .context
        .disable_features(
            &ids(&["x", "y", "z"]),
            false,
            BulkStrategy::Atomic,
            &OperationOptions::new().without_rollback(),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.failures[0].feature_id, id("y"));
    assert_eq!(harness.tasks.restart_calls(), vec![vec!["t-y".to_string()]]);
    assert!(harness.tasks.is_running("t-y"));
}

#[tokio::test]
async fn test_best_effort_bulk_attempts_every_feature() {
    let harness = three_features().await;

    let result = harness
        .context
        .disable_features(&ids(&["x", "y", "z"]), false, BulkStrategy::BestEffort, &OperationOptions::new())
        .await;

    assert!(!result.success);
    assert!(result.skipped.is_empty());
    assert_eq!(result.outcomes.len(), 3);
    assert_eq!(result.failures.len(), 1);
    let mut succeeded = result.succeeded_features();
    succeeded.sort();
    assert_eq!(succeeded, ids(&["x", "z"]));
}

#[tokio::test]
async fn test_bulk_rejects_unresolvable_request() {
    let harness = Harness::new().await;
    harness
        .register(FeatureConfig::new("a").requires("ghost"))
        .await;

    let result = harness
        .context
        .enable_features(&ids(&["a"]), true, BulkStrategy::Sequential, &OperationOptions::new())
        .await;

    assert!(!result.success);
    assert!(result.outcomes.is_empty());
    assert_eq!(result.failures[0].feature_id, id("a"));
    assert_eq!(result.failures[0].message, "missing dependency ghost");
}

#[tokio::test]
async fn test_lifecycle_events_reach_subscribers_and_system_bus() {
    let harness = Harness::new().await;
    harness
        .register_with(
            FeatureConfig::new("momentum"),
            ResourceBindings::new().with_services(["s1"]),
        )
        .await;
    let recorder = Arc::new(Recorder::default());
    harness.context.events().subscribe(
        Subscription::new("dashboard").for_features([id("momentum")]),
        recorder.clone(),
    );

    harness
        .context
        .enable_feature(&id("momentum"), &OperationOptions::new())
        .await
        .unwrap();
    harness
        .context
        .disable_feature(&id("momentum"), &OperationOptions::new())
        .await
        .unwrap();
    harness.context.events().flush().await;

    let kinds = recorder.kinds();
    for expected in [
        EventKind::ActivationStarted,
        EventKind::ActivationCompleted,
        EventKind::DeactivationStarted,
        EventKind::DeactivationProgress,
        EventKind::CleanupStarted,
        EventKind::CleanupCompleted,
        EventKind::DeactivationCompleted,
        EventKind::FeatureStateChanged,
    ] {
        assert!(kinds.contains(&expected), "missing {expected:?} in {kinds:?}");
    }

    let topics = harness.bus.topics();
    assert!(topics.contains(&"feature.activation_completed".to_string()));
    assert!(topics.contains(&"feature.deactivation_completed".to_string()));
    assert!(!topics.contains(&"feature.deactivation_progress".to_string()));
}

#[tokio::test]
async fn test_unregister_removes_feature_from_graph() {
    let harness = pair().await;

    assert!(harness.context.unregister_feature(&id("a")).await.unwrap());
    assert!(!harness.context.unregister_feature(&id("a")).await.unwrap());
    assert!(!harness.context.graph().contains(&id("a")));
    assert!(harness.context.graph().get_dependents(&id("b")).is_empty());

    let actions: Vec<AuditAction> = harness
        .store
        .audit_entries()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec![AuditAction::Register, AuditAction::Register, AuditAction::Unregister]
    );
}

#[tokio::test]
async fn test_maintenance_scheduler_runs_and_shuts_down() {
    let harness = pair().await;
    harness
        .context
        .resolve_enable_order(&ids(&["a"]), true);

    let scheduler = harness.context.start_maintenance();
    assert_eq!(scheduler.tasks().len(), 3);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(scheduler.tasks().iter().all(|task| task.runs() >= 1));
    scheduler.shutdown().await;
}
