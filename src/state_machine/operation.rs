//! # Lifecycle Operation
//!
//! The record of one enable/disable run for a single feature. Stage progression is
//! validated here; the orchestrator only feeds it [`OperationEvent`]s.

use super::errors::{StateMachineError, StateMachineResult};
use super::events::OperationEvent;
use super::states::{LifecycleStage, OperationKind, OperationStatus};
use crate::models::{FeatureId, ResourceKind};
use crate::recovery::ErrorCategory;
use crate::resources::{CleanupReport, ResourceSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Precise per-stage accounting of what a stopper managed to stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: LifecycleStage,
    pub kind: Option<ResourceKind>,
    pub requested: Vec<String>,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub attempts: u32,
}

impl StageOutcome {
    pub fn new(stage: LifecycleStage, kind: Option<ResourceKind>) -> Self {
        Self {
            stage,
            kind,
            requested: Vec::new(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            attempts: 0,
        }
    }

    /// Ids requested but not (yet) confirmed stopped
    pub fn remaining(&self) -> Vec<String> {
        self.requested
            .iter()
            .filter(|id| !self.succeeded.contains(id))
            .cloned()
            .collect()
    }

    /// Merge the result of one stop attempt
    pub fn record_attempt(&mut self, attempted: &[String], stopped: &[String]) {
        self.attempts += 1;
        for id in attempted {
            if !self.requested.contains(id) {
                self.requested.push(id.clone());
            }
        }
        for id in stopped {
            if attempted.contains(id) && !self.succeeded.contains(id) {
                self.succeeded.push(id.clone());
            }
        }
        self.failed = self.remaining();
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One lifecycle operation for one feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleOperation {
    pub id: Uuid,
    pub feature_id: FeatureId,
    pub kind: OperationKind,
    pub stage: LifecycleStage,
    pub status: OperationStatus,
    pub stages_completed: Vec<LifecycleStage>,
    pub stages_failed: Vec<LifecycleStage>,
    pub stages_skipped: Vec<LifecycleStage>,
    pub stage_outcomes: BTreeMap<LifecycleStage, StageOutcome>,
    pub rollback_data: Option<ResourceSnapshot>,
    pub rolled_back: bool,
    pub cleanup_report: Option<CleanupReport>,
    pub error_message: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub recovery_session_id: Option<Uuid>,
    pub reason: Option<String>,
    pub actor: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LifecycleOperation {
    pub fn new(feature_id: FeatureId, kind: OperationKind, actor: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            feature_id,
            kind,
            stage: kind.pipeline()[0],
            status: OperationStatus::Pending,
            stages_completed: Vec::new(),
            stages_failed: Vec::new(),
            stages_skipped: Vec::new(),
            stage_outcomes: BTreeMap::new(),
            rollback_data: None,
            rolled_back: false,
            cleanup_report: None,
            error_message: None,
            error_category: None,
            recovery_session_id: None,
            reason: None,
            actor: actor.into(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    /// Mark the operation as running
    pub fn start(&mut self) -> StateMachineResult<()> {
        if self.status.is_terminal() {
            return Err(StateMachineError::AlreadyTerminal {
                status: self.status.to_string(),
            });
        }
        self.status = OperationStatus::InProgress;
        Ok(())
    }

    /// Apply an event and return the resulting stage
    pub fn apply(&mut self, event: OperationEvent) -> StateMachineResult<LifecycleStage> {
        let target = self.determine_target_stage(&event)?;
        let current = self.stage;

        match &event {
            OperationEvent::StageSucceeded => self.stages_completed.push(current),
            OperationEvent::StageSkipped => self.stages_skipped.push(current),
            OperationEvent::StageFailed(message) => {
                self.stages_failed.push(current);
                self.status = OperationStatus::Failed;
                self.error_message = Some(message.clone());
            }
            OperationEvent::RolledBack => self.rolled_back = true,
            OperationEvent::RollbackFailed(message) => {
                self.status = OperationStatus::Partial;
                let combined = match self.error_message.take() {
                    Some(original) => format!("{original}; rollback failed: {message}"),
                    None => format!("rollback failed: {message}"),
                };
                self.error_message = Some(combined);
            }
        }

        self.stage = target;
        if target == LifecycleStage::Completed {
            self.status = OperationStatus::Completed;
            // Snapshot is only kept around for rollback of a failed operation
            self.rollback_data = None;
        }
        if target.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }

        Ok(target)
    }

    fn determine_target_stage(&self, event: &OperationEvent) -> StateMachineResult<LifecycleStage> {
        let target = match (self.stage, event) {
            (stage, OperationEvent::StageSucceeded) if !stage.is_terminal() => self.next_stage(stage),
            (stage, OperationEvent::StageSkipped) if stage.is_skippable() => self.next_stage(stage),
            (stage, OperationEvent::StageFailed(_)) if !stage.is_terminal() => {
                LifecycleStage::Failed
            }
            (LifecycleStage::Failed, OperationEvent::RolledBack)
            | (LifecycleStage::Failed, OperationEvent::RollbackFailed(_)) => LifecycleStage::Failed,
            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };
        Ok(target)
    }

    fn next_stage(&self, stage: LifecycleStage) -> LifecycleStage {
        let pipeline = self.kind.pipeline();
        pipeline
            .iter()
            .position(|s| *s == stage)
            .and_then(|idx| pipeline.get(idx + 1))
            .copied()
            .unwrap_or(LifecycleStage::Completed)
    }

    /// Outcome record for a stage, created on first use
    pub fn outcome_mut(&mut self, stage: LifecycleStage) -> &mut StageOutcome {
        self.stage_outcomes
            .entry(stage)
            .or_insert_with(|| StageOutcome::new(stage, stage.stopped_kind()))
    }

    /// Ids confirmed stopped for a resource kind during this operation
    pub fn stopped_ids(&self, kind: ResourceKind) -> Vec<String> {
        self.stage_outcomes
            .values()
            .filter(|outcome| outcome.kind == Some(kind))
            .flat_map(|outcome| outcome.succeeded.iter().cloned())
            .collect()
    }

    /// Fraction of the pipeline finished, as a percentage
    pub fn progress_percentage(&self) -> f32 {
        let total = self.kind.pipeline().len() as f32;
        let done = (self.stages_completed.len() + self.stages_skipped.len()) as f32;
        (done / total * 100.0).min(100.0)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds())
    }
}
