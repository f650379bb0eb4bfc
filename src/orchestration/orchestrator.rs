//! # Lifecycle Orchestrator
//!
//! Drives one feature at a time through its activation or deactivation pipeline.
//!
//! ## Deactivation
//!
//! `Preparation → StoppingTasks → StoppingAgents → StoppingServices → CleanupResources →
//! Finalization`, ending in `Completed` or `Failed`.
//!
//! - `Preparation` snapshots what the feature holds, once per operation.
//! - Each stopping stage calls the [`ResourceStopper`] registered for its resource kind
//!   with the ids bound to the feature. Ids a stopper did not confirm keep the stage
//!   failed, and a retry only targets those.
//! - Any stage error goes to the [`ErrorRecoveryManager`]. A recovered session gives one
//!   in-place retry or a skip; anything else fails the operation, after which the
//!   snapshot drives a best-effort rollback.
//!
//! ## Exclusivity
//!
//! At most one operation runs per feature. A request arriving while one is in flight
//! waits for it and receives the same final result.

use crate::collaborators::{FeatureStore, ResourceStopper};
use crate::config::OrchestratorConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::events::EventBroadcaster;
use crate::graph::{DependencyResolver, FeatureGraphRegistry};
use crate::logging::{log_feature_operation, log_stage_transition};
use crate::models::{
    AuditAction, AuditEntry, FeatureId, FeatureState, FeatureStatus, ResourceBindings,
    ResourceKind,
};
use crate::recovery::{
    ErrorCategory, ErrorRecoveryManager, RecoveryContext, RecoveryDirective, RecoverySession,
    RecoveryStatus,
};
use crate::resources::CleanupManager;
use crate::state_machine::{
    LifecycleOperation, LifecycleStage, OperationEvent, OperationKind, OperationStatus,
};
use crate::utils::time::retention_cutoff;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Per-request knobs
#[derive(Debug, Clone)]
pub struct OperationOptions {
    pub reason: Option<String>,
    /// Defaults to the configured actor
    pub actor: Option<String>,
    /// Restore stopped resources from the snapshot when the operation fails
    pub rollback_on_failure: bool,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            reason: None,
            actor: None,
            rollback_on_failure: true,
        }
    }
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn without_rollback(mut self) -> Self {
        self.rollback_on_failure = false;
        self
    }
}

/// Result of asking for a feature to be enabled or disabled
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OperationOutcome {
    /// Feature was already in the requested state; nothing ran
    Unchanged {
        feature_id: FeatureId,
        status: FeatureStatus,
    },
    Executed(Box<LifecycleOperation>),
}

impl OperationOutcome {
    pub fn feature_id(&self) -> &FeatureId {
        match self {
            Self::Unchanged { feature_id, .. } => feature_id,
            Self::Executed(operation) => &operation.feature_id,
        }
    }

    pub fn operation(&self) -> Option<&LifecycleOperation> {
        match self {
            Self::Unchanged { .. } => None,
            Self::Executed(operation) => Some(operation),
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Self::Unchanged { .. } => true,
            Self::Executed(operation) => operation.status == OperationStatus::Completed,
        }
    }
}

#[derive(Debug, Clone)]
struct TrackedOperation {
    operation: LifecycleOperation,
    outcome: Option<OperationOutcome>,
}

type ActiveOperations = Mutex<HashMap<FeatureId, watch::Receiver<TrackedOperation>>>;

/// Removes the feature from the active set when the owning run ends, however it ends
struct ActiveGuard<'a> {
    active: &'a ActiveOperations,
    feature_id: FeatureId,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.feature_id);
    }
}

enum Claim<'a> {
    /// Same kind already running; share its outcome
    Joined(watch::Receiver<TrackedOperation>),
    /// Opposite kind running; wait for it to release the feature
    Busy(watch::Receiver<TrackedOperation>),
    Owned(ActiveGuard<'a>, watch::Sender<TrackedOperation>),
}

/// Why a pipeline stopped early
#[derive(Debug)]
struct StageFailure {
    stage: LifecycleStage,
    message: String,
    category: Option<ErrorCategory>,
    force_rollback: bool,
    emergency: bool,
}

impl StageFailure {
    fn from_error(stage: LifecycleStage, error: &anyhow::Error, session: Option<&RecoverySession>) -> Self {
        Self {
            stage,
            message: format!("{error:#}"),
            category: session.map(|s| s.category),
            force_rollback: false,
            emergency: session.is_some_and(|s| s.status == RecoveryStatus::EmergencyStopped),
        }
    }
}

enum StageResolution {
    Succeeded,
    Skipped,
}

/// Request-scoped values threaded through one run
struct RunContext {
    options: OperationOptions,
    actor: String,
    previous: Option<FeatureStatus>,
}

pub struct LifecycleOrchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn FeatureStore>,
    graphs: Arc<FeatureGraphRegistry>,
    resolver: Arc<DependencyResolver>,
    cleanup: Arc<CleanupManager>,
    recovery: Arc<ErrorRecoveryManager>,
    events: Arc<EventBroadcaster>,
    stoppers: HashMap<ResourceKind, Arc<dyn ResourceStopper>>,
    bindings: DashMap<FeatureId, ResourceBindings>,
    active: ActiveOperations,
    history: Mutex<VecDeque<LifecycleOperation>>,
}

impl std::fmt::Debug for LifecycleOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleOrchestrator")
            .field("config", &self.config)
            .field("stoppers", &self.stoppers.keys().collect::<Vec<_>>())
            .field("active", &self.active.lock().len())
            .finish()
    }
}

impl LifecycleOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn FeatureStore>,
        graphs: Arc<FeatureGraphRegistry>,
        resolver: Arc<DependencyResolver>,
        cleanup: Arc<CleanupManager>,
        recovery: Arc<ErrorRecoveryManager>,
        events: Arc<EventBroadcaster>,
    ) -> Self {
        Self {
            config,
            store,
            graphs,
            resolver,
            cleanup,
            recovery,
            events,
            stoppers: HashMap::new(),
            bindings: DashMap::new(),
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Register the stopper responsible for one stoppable resource kind
    pub fn with_stopper(mut self, kind: ResourceKind, stopper: Arc<dyn ResourceStopper>) -> Self {
        self.stoppers.insert(kind, stopper);
        self
    }

    pub(crate) fn graphs(&self) -> &Arc<FeatureGraphRegistry> {
        &self.graphs
    }

    pub(crate) fn resolver(&self) -> &Arc<DependencyResolver> {
        &self.resolver
    }

    /// Record which tasks, agents and services belong to a feature
    pub fn register_bindings(&self, feature_id: FeatureId, bindings: ResourceBindings) {
        debug!(%feature_id, "Resource bindings registered");
        self.bindings.insert(feature_id, bindings);
    }

    pub fn remove_bindings(&self, feature_id: &FeatureId) -> Option<ResourceBindings> {
        self.bindings.remove(feature_id).map(|(_, bindings)| bindings)
    }

    pub fn bindings_for(&self, feature_id: &FeatureId) -> ResourceBindings {
        self.bindings
            .get(feature_id)
            .map(|bindings| bindings.clone())
            .unwrap_or_default()
    }

    /// Live view of the in-flight operation for a feature
    pub fn active_operation(&self, feature_id: &FeatureId) -> Option<LifecycleOperation> {
        self.active
            .lock()
            .get(feature_id)
            .map(|rx| rx.borrow().operation.clone())
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Finished operations, oldest first, optionally for one feature
    pub fn operation_history(&self, feature_id: Option<&FeatureId>) -> Vec<LifecycleOperation> {
        self.history
            .lock()
            .iter()
            .filter(|op| feature_id.map_or(true, |id| &op.feature_id == id))
            .cloned()
            .collect()
    }

    pub fn prune_history(&self, older_than: Duration) -> usize {
        let cutoff = retention_cutoff(older_than);
        let mut history = self.history.lock();
        let before = history.len();
        history.retain(|op| op.completed_at.unwrap_or(op.started_at) >= cutoff);
        before - history.len()
    }

    #[instrument(skip(self, options), fields(feature_id = %feature_id))]
    pub async fn deactivate_feature(
        &self,
        feature_id: &FeatureId,
        options: &OperationOptions,
    ) -> LifecycleResult<OperationOutcome> {
        self.run_exclusive(feature_id, OperationKind::Disable, options)
            .await
    }

    #[instrument(skip(self, options), fields(feature_id = %feature_id))]
    pub async fn activate_feature(
        &self,
        feature_id: &FeatureId,
        options: &OperationOptions,
    ) -> LifecycleResult<OperationOutcome> {
        self.run_exclusive(feature_id, OperationKind::Enable, options)
            .await
    }

    pub(crate) async fn run_single(
        &self,
        kind: OperationKind,
        feature_id: &FeatureId,
        options: &OperationOptions,
    ) -> LifecycleResult<OperationOutcome> {
        match kind {
            OperationKind::Enable => self.activate_feature(feature_id, options).await,
            OperationKind::Disable => self.deactivate_feature(feature_id, options).await,
        }
    }

    async fn run_exclusive(
        &self,
        feature_id: &FeatureId,
        kind: OperationKind,
        options: &OperationOptions,
    ) -> LifecycleResult<OperationOutcome> {
        let registered = self
            .store
            .get_config(feature_id)
            .await
            .map_err(|e| LifecycleError::collaborator(&e))?;
        if registered.is_none() {
            return Err(LifecycleError::FeatureNotFound(feature_id.clone()));
        }

        let actor = options
            .actor
            .clone()
            .unwrap_or_else(|| self.config.default_actor.clone());
        let (operation, guard, tx) = loop {
            let operation = LifecycleOperation::new(feature_id.clone(), kind, actor.clone())
                .with_reason(options.reason.clone());
            match self.claim(&operation) {
                Claim::Joined(rx) => {
                    debug!(%feature_id, %kind, "Joining in-flight operation");
                    return Ok(Self::join(rx).await);
                }
                Claim::Busy(rx) => {
                    debug!(%feature_id, %kind, "Waiting for in-flight operation of the opposite kind");
                    Self::wait_for_release(rx).await;
                }
                Claim::Owned(guard, tx) => break (operation, guard, tx),
            }
        };

        let result = self
            .run_owned(operation, RunContext {
                options: options.clone(),
                actor,
                previous: None,
            }, &tx)
            .await;

        if let Ok(outcome) = &result {
            tx.send_modify(|tracked| tracked.outcome = Some(outcome.clone()));
        }
        drop(guard);
        result
    }

    fn claim(&self, operation: &LifecycleOperation) -> Claim<'_> {
        let mut active = self.active.lock();
        if let Some(rx) = active.get(&operation.feature_id) {
            return if rx.borrow().operation.kind == operation.kind {
                Claim::Joined(rx.clone())
            } else {
                Claim::Busy(rx.clone())
            };
        }
        let (tx, rx) = watch::channel(TrackedOperation {
            operation: operation.clone(),
            outcome: None,
        });
        active.insert(operation.feature_id.clone(), rx);
        Claim::Owned(
            ActiveGuard {
                active: &self.active,
                feature_id: operation.feature_id.clone(),
            },
            tx,
        )
    }

    async fn join(mut rx: watch::Receiver<TrackedOperation>) -> OperationOutcome {
        if let Ok(tracked) = rx.wait_for(|tracked| tracked.outcome.is_some()).await {
            if let Some(outcome) = tracked.outcome.clone() {
                return outcome;
            }
        }
        // Owner ended without an outcome; report the last state it published
        let operation = rx.borrow().operation.clone();
        OperationOutcome::Executed(Box::new(operation))
    }

    /// Resolves once the owner has dropped its sender, which happens after its
    /// active-map entry is removed
    async fn wait_for_release(mut rx: watch::Receiver<TrackedOperation>) {
        while rx.changed().await.is_ok() {}
    }

    async fn run_owned(
        &self,
        mut op: LifecycleOperation,
        mut ctx: RunContext,
        tx: &watch::Sender<TrackedOperation>,
    ) -> LifecycleResult<OperationOutcome> {
        let state = self
            .store
            .get_state(&op.feature_id)
            .await
            .map_err(|e| LifecycleError::collaborator(&e))?;
        let current = state.map(|s| s.status).unwrap_or_default();
        ctx.previous = Some(current);

        let target = match op.kind {
            OperationKind::Enable => FeatureStatus::Enabled,
            OperationKind::Disable => FeatureStatus::Disabled,
        };
        if current == target {
            debug!(feature_id = %op.feature_id, status = %current, "Feature already in requested state");
            return Ok(OperationOutcome::Unchanged {
                feature_id: op.feature_id,
                status: current,
            });
        }

        op.start()?;
        let operation_id = op.id.to_string();
        log_feature_operation(
            &op.kind.to_string(),
            op.feature_id.as_str(),
            Some(&operation_id),
            "started",
            ctx.options.reason.as_deref(),
        );
        self.events.start_progress(
            operation_id.clone(),
            Some(op.feature_id.clone()),
            Some(format!("{} started", op.kind)),
        );
        match op.kind {
            OperationKind::Enable => self.events.emit_activation_started(&op.feature_id, op.id).await,
            OperationKind::Disable => self.events.emit_deactivation_started(&op.feature_id, op.id).await,
        }
        self.publish_state(&op, tx);

        let deadline = self.config.operation_timeout();
        let run = tokio::time::timeout(deadline, self.drive(&mut op, &ctx, tx)).await;
        let failure = match run {
            Ok(Ok(())) => None,
            Ok(Err(failure)) => Some(failure),
            // Deadline hit while reporting after the last stage
            Err(_) if op.is_terminal() => None,
            Err(_) => Some(self.deadline_exceeded(&mut op, deadline).await),
        };

        match failure {
            None => self.complete(&op, &operation_id).await,
            Some(failure) => self.fail(&mut op, failure, &ctx).await?,
        }

        self.recovery.reset_retry_count(&op.feature_id);
        self.publish_state(&op, tx);
        log_feature_operation(
            &op.kind.to_string(),
            op.feature_id.as_str(),
            Some(&operation_id),
            &op.status.to_string(),
            op.error_message.as_deref(),
        );
        self.remember(&op);
        Ok(OperationOutcome::Executed(Box::new(op)))
    }

    async fn drive(
        &self,
        op: &mut LifecycleOperation,
        ctx: &RunContext,
        tx: &watch::Sender<TrackedOperation>,
    ) -> Result<(), StageFailure> {
        let pipeline = op.kind.pipeline();
        for &stage in pipeline {
            let started = Instant::now();
            let resolution = match self.execute_stage(op, stage, ctx).await {
                Ok(()) => StageResolution::Succeeded,
                Err(error) => self.recover_stage(op, stage, error, ctx).await?,
            };
            let event = match resolution {
                StageResolution::Succeeded => OperationEvent::StageSucceeded,
                StageResolution::Skipped => OperationEvent::StageSkipped,
            };
            let next = op.apply(event).map_err(|e| StageFailure {
                stage,
                message: e.to_string(),
                category: None,
                force_rollback: false,
                emergency: false,
            })?;

            log_stage_transition(
                op.feature_id.as_str(),
                &op.id.to_string(),
                &stage.to_string(),
                &next.to_string(),
                Some(started.elapsed().as_millis() as u64),
            );
            self.report_progress(op, tx).await;
        }
        Ok(())
    }

    async fn recover_stage(
        &self,
        op: &mut LifecycleOperation,
        stage: LifecycleStage,
        error: anyhow::Error,
        ctx: &RunContext,
    ) -> Result<StageResolution, StageFailure> {
        let message = format!("{error:#}");
        warn!(feature_id = %op.feature_id, %stage, error = %message, "Stage failed, attempting recovery");
        self.events
            .emit_recovery_started(&op.feature_id, op.id, stage, &message)
            .await;

        let context = RecoveryContext::new(op.feature_id.clone())
            .for_stage(op.id, stage)
            .with_rollback(op.rollback_data.is_some());
        let session = self.recovery.handle_error(&error, &context).await;
        self.events.emit_recovery_completed(&session).await;
        op.recovery_session_id = Some(session.id);
        op.error_category = Some(session.category);

        let directive = if session.is_recovered() {
            session.directive
        } else {
            None
        };
        match directive {
            Some(RecoveryDirective::RetryStage) => {
                info!(feature_id = %op.feature_id, %stage, "Retrying stage after recovery");
                match self.execute_stage(op, stage, ctx).await {
                    Ok(()) => Ok(StageResolution::Succeeded),
                    Err(retry_error) => Err(StageFailure::from_error(stage, &retry_error, Some(&session))),
                }
            }
            Some(RecoveryDirective::SkipStage) => {
                warn!(feature_id = %op.feature_id, %stage, "Skipping stage after recovery");
                Ok(StageResolution::Skipped)
            }
            Some(RecoveryDirective::RollbackOperation) => Err(StageFailure {
                force_rollback: true,
                ..StageFailure::from_error(stage, &error, Some(&session))
            }),
            None => Err(StageFailure::from_error(stage, &error, Some(&session))),
        }
    }

    /// Whole-operation deadline: recorded with recovery like any stage error, but with
    /// no time left to retry
    async fn deadline_exceeded(&self, op: &mut LifecycleOperation, deadline: Duration) -> StageFailure {
        let stage = op.stage;
        let error = anyhow::Error::new(LifecycleError::OperationTimeout {
            operation: format!("{} {}", op.kind, op.feature_id),
            timeout: deadline,
        });
        error!(feature_id = %op.feature_id, %stage, ?deadline, "Operation deadline exceeded");
        let context = RecoveryContext::new(op.feature_id.clone())
            .for_stage(op.id, stage)
            .with_rollback(op.rollback_data.is_some());
        let session = self.recovery.handle_error(&error, &context).await;
        self.events.emit_recovery_completed(&session).await;
        op.recovery_session_id = Some(session.id);
        StageFailure::from_error(stage, &error, Some(&session))
    }

    async fn execute_stage(
        &self,
        op: &mut LifecycleOperation,
        stage: LifecycleStage,
        ctx: &RunContext,
    ) -> anyhow::Result<()> {
        match (op.kind, stage) {
            (OperationKind::Disable, LifecycleStage::Preparation) => {
                self.prepare_deactivation(op);
                Ok(())
            }
            (OperationKind::Enable, LifecycleStage::Preparation) => self.prepare_activation(op).await,
            (_, LifecycleStage::StoppingTasks)
            | (_, LifecycleStage::StoppingAgents)
            | (_, LifecycleStage::StoppingServices) => self.stop_resources(op, stage).await,
            (_, LifecycleStage::CleanupResources) => self.cleanup_resources(op).await,
            (_, LifecycleStage::Finalization) => self.finalize(op, ctx).await,
            (_, LifecycleStage::Completed) | (_, LifecycleStage::Failed) => Ok(()),
        }
    }

    fn prepare_deactivation(&self, op: &mut LifecycleOperation) {
        if op.rollback_data.is_some() {
            return;
        }
        let bindings = self.bindings_for(&op.feature_id);
        let snapshot = self.cleanup.capture_snapshot(&op.feature_id, &bindings);
        debug!(
            feature_id = %op.feature_id,
            snapshot_id = %snapshot.id,
            resources = snapshot.total(),
            "Captured pre-operation snapshot"
        );
        op.rollback_data = Some(snapshot);
    }

    async fn prepare_activation(&self, op: &mut LifecycleOperation) -> anyhow::Result<()> {
        let graph = self.graphs.snapshot();
        let mut not_enabled = Vec::new();
        for edge in graph
            .get_dependencies(&op.feature_id)
            .iter()
            .filter(|edge| edge.is_hard_requirement())
        {
            if !self.status_of(&edge.target).await?.is_enabled() {
                not_enabled.push(edge.target.to_string());
            }
        }
        if !not_enabled.is_empty() {
            return Err(anyhow::Error::new(LifecycleError::StageFailure {
                stage: LifecycleStage::Preparation,
                category: ErrorCategory::Configuration,
                message: format!("required dependencies not enabled: {}", not_enabled.join(", ")),
            }));
        }

        for partner in graph.conflict_partners(&op.feature_id) {
            if self.status_of(&partner).await?.is_enabled() {
                warn!(feature_id = %op.feature_id, conflicting = %partner, "Enabling feature while a conflicting feature is enabled");
            }
        }
        Ok(())
    }

    async fn stop_resources(&self, op: &mut LifecycleOperation, stage: LifecycleStage) -> anyhow::Result<()> {
        let Some(kind) = stage.stopped_kind() else {
            return Ok(());
        };
        let ids = match op.stage_outcomes.get(&stage) {
            Some(outcome) if outcome.attempts > 0 => outcome.remaining(),
            _ => self.bindings_for(&op.feature_id).ids_for(kind).to_vec(),
        };
        if ids.is_empty() {
            return Ok(());
        }

        let Some(stopper) = self.stoppers.get(&kind) else {
            op.outcome_mut(stage).record_attempt(&ids, &[]);
            return Err(anyhow::Error::new(LifecycleError::StageFailure {
                stage,
                category: ErrorCategory::Configuration,
                message: format!("no stopper configured for {kind} resources"),
            }));
        };

        let stopped = match self
            .call(&format!("stop {kind} resources"), stopper.stop(&op.feature_id, &ids))
            .await
        {
            Ok(stopped) => stopped,
            Err(e) => {
                op.outcome_mut(stage).record_attempt(&ids, &[]);
                return Err(e);
            }
        };

        let outcome = op.outcome_mut(stage);
        outcome.record_attempt(&ids, &stopped);
        if outcome.is_complete() {
            return Ok(());
        }
        Err(anyhow::Error::new(LifecycleError::StageFailure {
            stage,
            category: ErrorCategory::Service,
            message: format!(
                "stopped {} of {} {kind} resources; still running: {}",
                outcome.succeeded.len(),
                outcome.requested.len(),
                outcome.failed.join(", ")
            ),
        }))
    }

    async fn cleanup_resources(&self, op: &mut LifecycleOperation) -> anyhow::Result<()> {
        self.events.emit_cleanup_started(&op.feature_id, op.id).await;
        let timeout = self.config.collaborator_timeout();
        let report = tokio::time::timeout(timeout, self.cleanup.cleanup(&op.feature_id))
            .await
            .map_err(|_| {
                anyhow::Error::new(LifecycleError::OperationTimeout {
                    operation: "resource cleanup".to_string(),
                    timeout,
                })
            })?;
        self.events
            .emit_cleanup_completed(&op.feature_id, op.id, &report)
            .await;
        op.cleanup_report = Some(report);
        Ok(())
    }

    async fn finalize(&self, op: &mut LifecycleOperation, ctx: &RunContext) -> anyhow::Result<()> {
        let (target, action) = match op.kind {
            OperationKind::Enable => (FeatureStatus::Enabled, AuditAction::Enable),
            OperationKind::Disable => (FeatureStatus::Disabled, AuditAction::Disable),
        };
        let state = FeatureState::new(op.feature_id.clone(), target).with_reason(ctx.options.reason.clone());
        self.call("persist feature state", self.store.put_state(&state))
            .await?;

        self.audit(
            AuditEntry::new(op.feature_id.clone(), action, ctx.actor.clone())
                .transition(ctx.previous, Some(target))
                .with_reason(ctx.options.reason.clone()),
        )
        .await;

        if op.kind == OperationKind::Disable {
            let released = self.cleanup.tracker().release(&op.feature_id);
            if released > 0 {
                debug!(feature_id = %op.feature_id, released, "Released late-tracked resources");
            }
        }
        self.events
            .emit_feature_state_changed(&op.feature_id, op.id, ctx.previous, target)
            .await;
        Ok(())
    }

    async fn complete(&self, op: &LifecycleOperation, operation_id: &str) {
        self.events.complete_progress(operation_id, true, None);
        match op.kind {
            OperationKind::Enable => {
                self.events
                    .emit_activation_completed(&op.feature_id, op.id, op.duration_ms())
                    .await
            }
            OperationKind::Disable => {
                self.events
                    .emit_deactivation_completed(&op.feature_id, op.id, op.duration_ms())
                    .await
            }
        }
    }

    async fn fail(
        &self,
        op: &mut LifecycleOperation,
        failure: StageFailure,
        ctx: &RunContext,
    ) -> LifecycleResult<()> {
        if failure.category.is_some() {
            op.error_category = failure.category;
        }
        op.apply(OperationEvent::StageFailed(failure.message.clone()))?;
        self.events
            .complete_progress(&op.id.to_string(), false, Some(failure.message.clone()));
        match op.kind {
            OperationKind::Enable => {
                self.events
                    .emit_activation_failed(&op.feature_id, op.id, failure.stage, &failure.message)
                    .await
            }
            OperationKind::Disable => {
                self.events
                    .emit_deactivation_failed(&op.feature_id, op.id, failure.stage, &failure.message)
                    .await
            }
        }

        if failure.emergency {
            let report = self.cleanup.force_cleanup(&op.feature_id).await;
            self.audit(
                AuditEntry::new(op.feature_id.clone(), AuditAction::ForceCleanup, ctx.actor.clone())
                    .with_reason(Some(format!("emergency stop after: {}", failure.message))),
            )
            .await;
            warn!(
                feature_id = %op.feature_id,
                released = report.released_items,
                "Emergency stop forced cleanup"
            );
        }

        if ctx.options.rollback_on_failure || failure.force_rollback {
            self.rollback(op, ctx).await?;
        }

        let restored = op.rolled_back && op.status == OperationStatus::Failed;
        if op.kind == OperationKind::Disable && !restored {
            let state = FeatureState::new(op.feature_id.clone(), FeatureStatus::Failed)
                .with_reason(op.error_message.clone());
            if let Err(e) = self.call("persist feature state", self.store.put_state(&state)).await {
                warn!(feature_id = %op.feature_id, error = %e, "Could not record failed state");
            }
        }
        Ok(())
    }

    /// Restart what this operation stopped, limited to kinds present in the snapshot.
    /// Problems degrade the operation to `Partial`; they are never raised.
    async fn rollback(&self, op: &mut LifecycleOperation, ctx: &RunContext) -> LifecycleResult<()> {
        let Some(snapshot) = op.rollback_data.clone() else {
            debug!(feature_id = %op.feature_id, "No snapshot; nothing to roll back");
            return Ok(());
        };

        let mut errors = Vec::new();
        let mut restarted = 0;
        for kind in ResourceKind::STOPPABLE.into_iter().rev() {
            if !snapshot.has_kind(kind) {
                continue;
            }
            let ids = op.stopped_ids(kind);
            if ids.is_empty() {
                continue;
            }
            let Some(stopper) = self.stoppers.get(&kind) else {
                errors.push(format!("no stopper configured for {kind} resources"));
                continue;
            };
            match self.call(&format!("restart {kind} resources"), stopper.restart(&ids)).await {
                Ok(()) => restarted += ids.len(),
                Err(e) => errors.push(format!("{kind}: {e:#}")),
            }
        }

        let success = errors.is_empty();
        if success {
            op.apply(OperationEvent::RolledBack)?;
            info!(feature_id = %op.feature_id, restarted, "Rollback completed");
        } else {
            let reason = errors.join("; ");
            let rollback_error = LifecycleError::RollbackFailure {
                feature_id: op.feature_id.clone(),
                reason: reason.clone(),
            };
            error!(error = %rollback_error, "Rollback degraded operation to partial");
            op.apply(OperationEvent::RollbackFailed(reason))?;
        }

        self.audit(
            AuditEntry::new(op.feature_id.clone(), AuditAction::Rollback, ctx.actor.clone())
                .with_reason(op.error_message.clone()),
        )
        .await;
        self.events
            .emit_rollback_completed(&op.feature_id, op.id, success, restarted)
            .await;
        Ok(())
    }

    async fn report_progress(&self, op: &LifecycleOperation, tx: &watch::Sender<TrackedOperation>) {
        self.publish_state(op, tx);
        let percentage = op.progress_percentage();
        self.events.update_progress(
            &op.id.to_string(),
            percentage,
            Some(op.stage.to_string()),
            None,
        );
        if op.kind == OperationKind::Disable {
            self.events
                .emit_deactivation_progress(&op.feature_id, op.id, op.stage, percentage)
                .await;
        }
    }

    fn publish_state(&self, op: &LifecycleOperation, tx: &watch::Sender<TrackedOperation>) {
        tx.send_modify(|tracked| tracked.operation = op.clone());
    }

    fn remember(&self, op: &LifecycleOperation) {
        let mut history = self.history.lock();
        history.push_back(op.clone());
        while history.len() > self.config.operation_history_limit {
            history.pop_front();
        }
    }

    async fn status_of(&self, feature_id: &FeatureId) -> anyhow::Result<FeatureStatus> {
        let state = self.call("load feature state", self.store.get_state(feature_id)).await?;
        Ok(state.map(|s| s.status).unwrap_or_default())
    }

    async fn audit(&self, entry: AuditEntry) {
        if let Err(e) = self.call("append audit entry", self.store.append_audit(&entry)).await {
            warn!(feature_id = %entry.feature_id, action = ?entry.action, error = %e, "Audit write failed");
        }
    }

    /// Bound a collaborator call by the configured timeout
    async fn call<T, F>(&self, operation: &str, future: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let timeout = self.config.collaborator_timeout();
        match tokio::time::timeout(timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::Error::new(LifecycleError::OperationTimeout {
                operation: operation.to_string(),
                timeout,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::memory::{InMemoryFeatureStore, MemoryStopper};
    use crate::config::LifecycleConfig;
    use crate::models::FeatureConfig;
    use crate::resources::ResourceTracker;

    struct Fixture {
        orchestrator: LifecycleOrchestrator,
        store: Arc<InMemoryFeatureStore>,
        agents: Arc<MemoryStopper>,
        _temp: tempfile::TempDir,
    }

    async fn fixture(configs: Vec<FeatureConfig>) -> Fixture {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = LifecycleConfig::default();
        config.recovery.base_delay_ms = 1;
        config.recovery.max_delay_ms = 5;
        config.orchestrator.operation_history_limit = 2;

        let store = Arc::new(InMemoryFeatureStore::with_configs(configs));
        let graphs = Arc::new(FeatureGraphRegistry::new());
        graphs.rebuild_from_store(store.as_ref()).await.unwrap();
        let agents = Arc::new(MemoryStopper::new());

        let orchestrator = LifecycleOrchestrator::new(
            config.orchestrator.clone(),
            store.clone(),
            graphs,
            Arc::new(DependencyResolver::new()),
            Arc::new(CleanupManager::new(Arc::new(ResourceTracker::new()), temp.path(), 10)),
            Arc::new(ErrorRecoveryManager::new(config.recovery.clone())),
            Arc::new(EventBroadcaster::new(config.events.clone())),
        )
        .with_stopper(ResourceKind::Agent, agents.clone());

        Fixture {
            orchestrator,
            store,
            agents,
            _temp: temp,
        }
    }

    #[test]
    fn test_options_default_to_rollback() {
        let options = OperationOptions::new().with_actor("ops").with_reason("maintenance");
        assert!(options.rollback_on_failure);
        assert!(!options.clone().without_rollback().rollback_on_failure);
        assert_eq!(options.actor.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn test_unregistered_feature_is_not_found() {
        let f = fixture(vec![]).await;
        let err = f
            .orchestrator
            .activate_feature(&FeatureId::from("nope"), &OperationOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::FeatureNotFound(_)));
        assert_eq!(f.orchestrator.active_count(), 0);
    }

    #[tokio::test]
    async fn test_disable_uses_actor_and_records_history() {
        let f = fixture(vec![FeatureConfig::new("a")]).await;
        let feature = FeatureId::from("a");
        f.orchestrator
            .register_bindings(feature.clone(), ResourceBindings::new().with_agents(["a1"]));

        let enabled = f
            .orchestrator
            .activate_feature(&feature, &OperationOptions::new())
            .await
            .unwrap();
        assert!(enabled.is_success());
        assert_eq!(enabled.operation().unwrap().actor, "system");

        let disabled = f
            .orchestrator
            .deactivate_feature(&feature, &OperationOptions::new().with_actor("ops"))
            .await
            .unwrap();
        let op = disabled.operation().unwrap();
        assert_eq!(op.status, OperationStatus::Completed);
        assert_eq!(op.actor, "ops");
        assert_eq!(op.stopped_ids(ResourceKind::Agent), vec!["a1".to_string()]);
        assert_eq!(f.agents.stop_calls().len(), 1);

        let audit = f.store.audit_entries();
        let last = audit.last().unwrap();
        assert_eq!(last.action, AuditAction::Disable);
        assert_eq!(last.actor, "ops");

        assert_eq!(f.orchestrator.operation_history(Some(&feature)).len(), 2);
        assert_eq!(f.orchestrator.prune_history(Duration::from_secs(3600)), 0);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let f = fixture(vec![FeatureConfig::new("a")]).await;
        let feature = FeatureId::from("a");
        for _ in 0..2 {
            f.orchestrator
                .activate_feature(&feature, &OperationOptions::new())
                .await
                .unwrap();
            f.orchestrator
                .deactivate_feature(&feature, &OperationOptions::new())
                .await
                .unwrap();
        }
        let history = f.orchestrator.operation_history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].kind, OperationKind::Disable);
    }

    #[tokio::test]
    async fn test_state_write_failure_fails_finalization() {
        let f = fixture(vec![FeatureConfig::new("a")]).await;
        f.store.fail_state_writes(true);

        let outcome = f
            .orchestrator
            .activate_feature(&FeatureId::from("a"), &OperationOptions::new())
            .await
            .unwrap();
        let op = outcome.operation().unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(op.stages_failed, vec![LifecycleStage::Finalization]);
    }
}
