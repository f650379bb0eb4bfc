//! # Error Recovery Manager
//!
//! Classifies a failure, then walks the ordered [`RecoveryAction`]s registered for its
//! category until one succeeds. Each action runs under its own timeout; a timed-out
//! action counts as a failed one.
//!
//! A recovered session carries a [`RecoveryDirective`] telling the orchestrator what to
//! do next. Manual intervention and emergency stop end the session without looping.

use super::backoff::{BackoffCalculator, BackoffConfig};
use super::classifier::{ErrorCategory, ErrorClassifier, ErrorSeverity, StandardErrorClassifier};
use crate::config::RecoveryConfig;
use crate::logging::log_recovery_attempt;
use crate::models::FeatureId;
use crate::state_machine::LifecycleStage;
use crate::utils::time::retention_cutoff;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    Rollback,
    Skip,
    ManualIntervention,
    EmergencyStop,
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => write!(f, "retry"),
            Self::Rollback => write!(f, "rollback"),
            Self::Skip => write!(f, "skip"),
            Self::ManualIntervention => write!(f, "manual_intervention"),
            Self::EmergencyStop => write!(f, "emergency_stop"),
        }
    }
}

/// What the orchestrator should do after a successful recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryDirective {
    RetryStage,
    SkipStage,
    RollbackOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    InProgress,
    Recovered,
    Failed,
    ManualInterventionRequired,
    EmergencyStopped,
}

impl RecoveryStatus {
    pub fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered)
    }
}

/// Where the failure happened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryContext {
    pub feature_id: FeatureId,
    pub operation_id: Option<Uuid>,
    pub stage: Option<LifecycleStage>,
    /// Whether a pre-operation snapshot exists to roll back to
    pub rollback_available: bool,
}

impl RecoveryContext {
    pub fn new(feature_id: FeatureId) -> Self {
        Self {
            feature_id,
            operation_id: None,
            stage: None,
            rollback_available: false,
        }
    }

    pub fn for_stage(mut self, operation_id: Uuid, stage: LifecycleStage) -> Self {
        self.operation_id = Some(operation_id);
        self.stage = Some(stage);
        self
    }

    pub fn with_rollback(mut self, available: bool) -> Self {
        self.rollback_available = available;
        self
    }
}

/// Host-supplied remediation; `Ok(true)` means the action succeeded
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    async fn attempt(&self, context: &RecoveryContext, error_message: &str) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct RecoveryAction {
    pub name: String,
    pub strategy: RecoveryStrategy,
    pub timeout: Duration,
    pub handler: Option<Arc<dyn RecoveryHandler>>,
}

impl fmt::Debug for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryAction")
            .field("name", &self.name)
            .field("strategy", &self.strategy)
            .field("timeout", &self.timeout)
            .field("custom_handler", &self.handler.is_some())
            .finish()
    }
}

impl RecoveryAction {
    pub fn new(name: impl Into<String>, strategy: RecoveryStrategy, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            strategy,
            timeout,
            handler: None,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn RecoveryHandler>) -> Self {
        self.handler = Some(handler);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionAttempt {
    pub action: String,
    pub strategy: RecoveryStrategy,
    pub succeeded: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySession {
    pub id: Uuid,
    pub feature_id: FeatureId,
    pub operation_id: Option<Uuid>,
    pub stage: Option<LifecycleStage>,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub error_message: String,
    pub status: RecoveryStatus,
    pub attempts: Vec<ActionAttempt>,
    pub directive: Option<RecoveryDirective>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecoverySession {
    pub fn is_recovered(&self) -> bool {
        self.status.is_recovered()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: Uuid,
    pub feature_id: FeatureId,
    pub operation_id: Option<Uuid>,
    pub stage: Option<LifecycleStage>,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryStatistics {
    pub total_errors: u64,
    pub successful_recoveries: u64,
    pub failed_recoveries: u64,
    pub manual_interventions: u64,
    pub emergency_stops: u64,
    pub errors_by_category: HashMap<ErrorCategory, u64>,
}

enum ActionOutcome {
    Recovered(RecoveryDirective),
    Halted(RecoveryStatus),
    NotApplicable(String),
}

pub struct ErrorRecoveryManager {
    config: RecoveryConfig,
    classifier: Arc<dyn ErrorClassifier>,
    backoff: BackoffCalculator,
    actions: RwLock<HashMap<ErrorCategory, Vec<RecoveryAction>>>,
    retry_counts: DashMap<(FeatureId, Option<LifecycleStage>), u32>,
    statistics: Mutex<RecoveryStatistics>,
    errors: Mutex<VecDeque<ErrorRecord>>,
    sessions: Mutex<VecDeque<RecoverySession>>,
    emergency_stop: AtomicBool,
}

impl fmt::Debug for ErrorRecoveryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorRecoveryManager")
            .field("classifier", &self.classifier.classifier_name())
            .field("config", &self.config)
            .finish()
    }
}

impl ErrorRecoveryManager {
    pub fn new(config: RecoveryConfig) -> Self {
        Self::with_classifier(config, Arc::new(StandardErrorClassifier::new()))
    }

    pub fn with_classifier(config: RecoveryConfig, classifier: Arc<dyn ErrorClassifier>) -> Self {
        let actions = Self::default_actions(config.action_timeout());
        Self {
            backoff: BackoffCalculator::new(BackoffConfig::from(&config)),
            config,
            classifier,
            actions: RwLock::new(actions),
            retry_counts: DashMap::new(),
            statistics: Mutex::new(RecoveryStatistics::default()),
            errors: Mutex::new(VecDeque::new()),
            sessions: Mutex::new(VecDeque::new()),
            emergency_stop: AtomicBool::new(false),
        }
    }

    fn default_actions(timeout: Duration) -> HashMap<ErrorCategory, Vec<RecoveryAction>> {
        use RecoveryStrategy::*;
        let action = |name: &str, strategy| RecoveryAction::new(name, strategy, timeout);

        ErrorCategory::ALL
            .into_iter()
            .map(|category| {
                let actions = match category {
                    ErrorCategory::Network => {
                        vec![action("retry_network", Retry), action("skip_stage", Skip)]
                    }
                    ErrorCategory::Timeout => {
                        vec![action("retry_timeout", Retry), action("skip_stage", Skip)]
                    }
                    ErrorCategory::Service => {
                        vec![action("retry_service", Retry), action("rollback", Rollback)]
                    }
                    ErrorCategory::Database => vec![
                        action("retry_database", Retry),
                        action("escalate", ManualIntervention),
                    ],
                    ErrorCategory::Resource => vec![
                        action("rollback", Rollback),
                        action("emergency_stop", EmergencyStop),
                    ],
                    ErrorCategory::Permission | ErrorCategory::Configuration => {
                        vec![action("escalate", ManualIntervention)]
                    }
                    ErrorCategory::Unknown => {
                        vec![action("retry", Retry), action("rollback", Rollback)]
                    }
                };
                (category, actions)
            })
            .collect()
    }

    /// Classify without recording anything
    pub fn classify(&self, error: &anyhow::Error) -> ErrorCategory {
        self.classifier.classify(error)
    }

    /// Append a custom action to the end of a category's list
    pub fn register_action(&self, category: ErrorCategory, action: RecoveryAction) {
        info!(%category, action = %action.name, strategy = %action.strategy, "Registered recovery action");
        self.actions.write().entry(category).or_default().push(action);
    }

    pub fn actions_for(&self, category: ErrorCategory) -> Vec<RecoveryAction> {
        self.actions
            .read()
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    /// Run recovery for one failure and return the finished session
    #[instrument(skip(self, error, context), fields(feature_id = %context.feature_id, stage = ?context.stage))]
    pub async fn handle_error(
        &self,
        error: &anyhow::Error,
        context: &RecoveryContext,
    ) -> RecoverySession {
        let category = self.classifier.classify(error);
        let severity = ErrorSeverity::for_category(category);
        let message = format!("{error:#}");
        self.record_error(context, category, severity, &message);

        warn!(%category, %severity, error = %message, "Starting error recovery");

        let mut session = RecoverySession {
            id: Uuid::new_v4(),
            feature_id: context.feature_id.clone(),
            operation_id: context.operation_id,
            stage: context.stage,
            category,
            severity,
            error_message: message.clone(),
            status: RecoveryStatus::InProgress,
            attempts: Vec::new(),
            directive: None,
            started_at: Utc::now(),
            completed_at: None,
        };

        for action in self.actions_for(category) {
            let started = Instant::now();
            let result = tokio::time::timeout(action.timeout, self.run_action(&action, context, &message)).await;

            let (succeeded, failure, outcome) = match result {
                Ok(Ok(ActionOutcome::NotApplicable(reason))) => (false, Some(reason), None),
                Ok(Ok(outcome)) => (true, None, Some(outcome)),
                Ok(Err(e)) => (false, Some(format!("{e:#}")), None),
                Err(_) => (
                    false,
                    Some(format!("action timed out after {:?}", action.timeout)),
                    None,
                ),
            };

            log_recovery_attempt(
                context.feature_id.as_str(),
                &category.to_string(),
                &action.name,
                succeeded,
                failure.as_deref(),
            );
            session.attempts.push(ActionAttempt {
                action: action.name.clone(),
                strategy: action.strategy,
                succeeded,
                error: failure,
                duration_ms: started.elapsed().as_millis() as u64,
            });

            match outcome {
                Some(ActionOutcome::Recovered(directive)) => {
                    session.status = RecoveryStatus::Recovered;
                    session.directive = Some(directive);
                    break;
                }
                Some(ActionOutcome::Halted(status)) => {
                    session.status = status;
                    break;
                }
                _ => {}
            }
        }

        if session.status == RecoveryStatus::InProgress {
            session.status = RecoveryStatus::Failed;
        }
        session.completed_at = Some(Utc::now());
        self.finish_session(&session);
        session
    }

    async fn run_action(
        &self,
        action: &RecoveryAction,
        context: &RecoveryContext,
        message: &str,
    ) -> anyhow::Result<ActionOutcome> {
        if let Some(handler) = &action.handler {
            return Ok(if handler.attempt(context, message).await? {
                Self::outcome_for(action.strategy)
            } else {
                ActionOutcome::NotApplicable("custom handler declined".to_string())
            });
        }

        let outcome = match action.strategy {
            RecoveryStrategy::Retry => {
                let key = (context.feature_id.clone(), context.stage);
                let attempt = self.retry_counts.get(&key).map(|count| *count).unwrap_or(0);
                if attempt >= self.config.max_retry_attempts {
                    return Ok(ActionOutcome::NotApplicable(format!(
                        "retry limit of {} reached",
                        self.config.max_retry_attempts
                    )));
                }
                self.retry_counts.insert(key, attempt + 1);
                tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                ActionOutcome::Recovered(RecoveryDirective::RetryStage)
            }
            RecoveryStrategy::Skip => match context.stage {
                Some(stage) if stage.is_skippable() => ActionOutcome::Recovered(RecoveryDirective::SkipStage),
                _ => ActionOutcome::NotApplicable("stage cannot be skipped".to_string()),
            },
            RecoveryStrategy::Rollback if context.rollback_available => {
                ActionOutcome::Recovered(RecoveryDirective::RollbackOperation)
            }
            RecoveryStrategy::Rollback => {
                ActionOutcome::NotApplicable("no snapshot to roll back to".to_string())
            }
            RecoveryStrategy::ManualIntervention | RecoveryStrategy::EmergencyStop => {
                Self::outcome_for(action.strategy)
            }
        };
        Ok(outcome)
    }

    fn outcome_for(strategy: RecoveryStrategy) -> ActionOutcome {
        match strategy {
            RecoveryStrategy::Retry => ActionOutcome::Recovered(RecoveryDirective::RetryStage),
            RecoveryStrategy::Skip => ActionOutcome::Recovered(RecoveryDirective::SkipStage),
            RecoveryStrategy::Rollback => ActionOutcome::Recovered(RecoveryDirective::RollbackOperation),
            RecoveryStrategy::ManualIntervention => {
                ActionOutcome::Halted(RecoveryStatus::ManualInterventionRequired)
            }
            RecoveryStrategy::EmergencyStop => ActionOutcome::Halted(RecoveryStatus::EmergencyStopped),
        }
    }

    fn record_error(
        &self,
        context: &RecoveryContext,
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: &str,
    ) {
        {
            let mut stats = self.statistics.lock();
            stats.total_errors += 1;
            *stats.errors_by_category.entry(category).or_insert(0) += 1;
        }
        let mut errors = self.errors.lock();
        errors.push_back(ErrorRecord {
            id: Uuid::new_v4(),
            feature_id: context.feature_id.clone(),
            operation_id: context.operation_id,
            stage: context.stage,
            category,
            severity,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        while errors.len() > self.config.max_history {
            errors.pop_front();
        }
    }

    fn finish_session(&self, session: &RecoverySession) {
        {
            let mut stats = self.statistics.lock();
            match session.status {
                RecoveryStatus::Recovered => stats.successful_recoveries += 1,
                RecoveryStatus::ManualInterventionRequired => stats.manual_interventions += 1,
                RecoveryStatus::EmergencyStopped => {
                    stats.emergency_stops += 1;
                    stats.failed_recoveries += 1;
                }
                RecoveryStatus::Failed | RecoveryStatus::InProgress => stats.failed_recoveries += 1,
            }
        }

        match session.status {
            RecoveryStatus::Recovered => info!(
                session_id = %session.id,
                directive = ?session.directive,
                "Recovery succeeded"
            ),
            RecoveryStatus::EmergencyStopped => {
                self.emergency_stop.store(true, Ordering::Release);
                error!(session_id = %session.id, "Emergency stop requested");
            }
            RecoveryStatus::ManualInterventionRequired => warn!(
                session_id = %session.id,
                category = %session.category,
                "Manual intervention required"
            ),
            _ => error!(
                session_id = %session.id,
                attempts = session.attempts.len(),
                "Recovery failed"
            ),
        }

        let mut sessions = self.sessions.lock();
        sessions.push_back(session.clone());
        while sessions.len() > self.config.max_history {
            sessions.pop_front();
        }
    }

    /// Forget retry attempts for a feature once its operation has finished
    pub fn reset_retry_count(&self, feature_id: &FeatureId) {
        self.retry_counts.retain(|(feature, _), _| feature != feature_id);
    }

    pub fn retry_count(&self, feature_id: &FeatureId, stage: Option<LifecycleStage>) -> u32 {
        self.retry_counts
            .get(&(feature_id.clone(), stage))
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub fn statistics(&self) -> RecoveryStatistics {
        self.statistics.lock().clone()
    }

    pub fn error_history(&self, since: Option<DateTime<Utc>>) -> Vec<ErrorRecord> {
        self.errors
            .lock()
            .iter()
            .filter(|record| since.map_or(true, |since| record.timestamp >= since))
            .cloned()
            .collect()
    }

    pub fn sessions(&self, since: Option<DateTime<Utc>>) -> Vec<RecoverySession> {
        self.sessions
            .lock()
            .iter()
            .filter(|session| since.map_or(true, |since| session.started_at >= since))
            .cloned()
            .collect()
    }

    /// Drop error records and sessions older than `older_than`; returns how many went
    pub fn prune_history(&self, older_than: Duration) -> usize {
        let cutoff = retention_cutoff(older_than);
        let mut removed = 0;
        {
            let mut errors = self.errors.lock();
            let before = errors.len();
            errors.retain(|record| record.timestamp >= cutoff);
            removed += before - errors.len();
        }
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|session| session.started_at >= cutoff);
        removed + before - sessions.len()
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stop.load(Ordering::Acquire)
    }

    pub fn clear_emergency_stop(&self) {
        self.emergency_stop.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LifecycleError;

    fn fast_config() -> RecoveryConfig {
        RecoveryConfig {
            max_retry_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
            ..RecoveryConfig::default()
        }
    }

    fn stage_context(stage: LifecycleStage) -> RecoveryContext {
        RecoveryContext::new(FeatureId::from("alpha")).for_stage(Uuid::new_v4(), stage)
    }

    #[tokio::test]
    async fn test_network_error_retries_until_cap_then_fails() {
        let manager = ErrorRecoveryManager::new(fast_config());
        let error = anyhow::anyhow!("connection reset by peer");
        let context = stage_context(LifecycleStage::StoppingAgents);

        for _ in 0..2 {
            let session = manager.handle_error(&error, &context).await;
            assert_eq!(session.category, ErrorCategory::Network);
            assert_eq!(session.directive, Some(RecoveryDirective::RetryStage));
        }

        // Retries exhausted and the stage cannot be skipped
        let session = manager.handle_error(&error, &context).await;
        assert_eq!(session.status, RecoveryStatus::Failed);
        assert_eq!(session.attempts.len(), 2);

        let stats = manager.statistics();
        assert_eq!(stats.total_errors, 3);
        assert_eq!(stats.successful_recoveries, 2);
        assert_eq!(stats.failed_recoveries, 1);
    }

    #[tokio::test]
    async fn test_skip_only_for_cleanup_stage() {
        let manager = ErrorRecoveryManager::new(RecoveryConfig {
            max_retry_attempts: 0,
            ..fast_config()
        });
        let error = anyhow::anyhow!("network unreachable");

        let session = manager
            .handle_error(&error, &stage_context(LifecycleStage::CleanupResources))
            .await;
        assert_eq!(session.directive, Some(RecoveryDirective::SkipStage));
    }

    #[tokio::test]
    async fn test_manual_intervention_does_not_loop() {
        let manager = ErrorRecoveryManager::new(fast_config());
        let error = anyhow::Error::new(LifecycleError::Configuration("bad".to_string()));
        let session = manager
            .handle_error(&error, &stage_context(LifecycleStage::StoppingTasks))
            .await;
        assert_eq!(session.status, RecoveryStatus::ManualInterventionRequired);
        assert_eq!(session.attempts.len(), 1);
        assert_eq!(manager.statistics().manual_interventions, 1);
    }

    #[tokio::test]
    async fn test_resource_error_rolls_back_or_emergency_stops() {
        let manager = ErrorRecoveryManager::new(fast_config());
        let error = anyhow::anyhow!("out of memory");

        let with_snapshot = stage_context(LifecycleStage::StoppingServices).with_rollback(true);
        let session = manager.handle_error(&error, &with_snapshot).await;
        assert_eq!(session.severity, ErrorSeverity::Critical);
        assert_eq!(session.directive, Some(RecoveryDirective::RollbackOperation));
        assert!(!manager.is_emergency_stopped());

        let without = stage_context(LifecycleStage::StoppingServices);
        let session = manager.handle_error(&error, &without).await;
        assert_eq!(session.status, RecoveryStatus::EmergencyStopped);
        assert!(manager.is_emergency_stopped());
    }

    struct SlowHandler;

    #[async_trait]
    impl RecoveryHandler for SlowHandler {
        async fn attempt(&self, _: &RecoveryContext, _: &str) -> anyhow::Result<bool> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(true)
        }
    }

    struct AlwaysHandler;

    #[async_trait]
    impl RecoveryHandler for AlwaysHandler {
        async fn attempt(&self, _: &RecoveryContext, _: &str) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_custom_actions_run_after_defaults_with_timeout() {
        let manager = ErrorRecoveryManager::new(fast_config());
        manager.register_action(
            ErrorCategory::Permission,
            RecoveryAction::new("slow", RecoveryStrategy::Retry, Duration::from_millis(10))
                .with_handler(Arc::new(SlowHandler)),
        );
        assert_eq!(manager.actions_for(ErrorCategory::Permission).len(), 2);

        // Permission escalates first, so the custom action is never reached
        let error = anyhow::anyhow!("permission denied");
        let session = manager
            .handle_error(&error, &stage_context(LifecycleStage::StoppingTasks))
            .await;
        assert_eq!(session.status, RecoveryStatus::ManualInterventionRequired);

        manager.register_action(
            ErrorCategory::Configuration,
            RecoveryAction::new("noop", RecoveryStrategy::Skip, Duration::from_millis(10))
                .with_handler(Arc::new(AlwaysHandler)),
        );
        let mut actions = manager.actions_for(ErrorCategory::Configuration);
        assert_eq!(actions.pop().map(|a| a.name), Some("noop".to_string()));
    }

    #[tokio::test]
    async fn test_timed_out_custom_action_is_a_failure() {
        let manager = ErrorRecoveryManager::new(fast_config());
        {
            let mut actions = manager.actions.write();
            actions.insert(
                ErrorCategory::Unknown,
                vec![RecoveryAction::new("slow", RecoveryStrategy::Retry, Duration::from_millis(10))
                    .with_handler(Arc::new(SlowHandler))],
            );
        }
        let session = manager
            .handle_error(&anyhow::anyhow!("mystery"), &stage_context(LifecycleStage::StoppingTasks))
            .await;
        assert_eq!(session.status, RecoveryStatus::Failed);
        assert!(session.attempts[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("timed out")));
    }

    #[tokio::test]
    async fn test_history_filters_and_retry_reset() {
        let manager = ErrorRecoveryManager::new(fast_config());
        let context = stage_context(LifecycleStage::StoppingTasks);
        manager
            .handle_error(&anyhow::anyhow!("socket closed"), &context)
            .await;
        assert_eq!(manager.retry_count(&context.feature_id, context.stage), 1);

        manager.reset_retry_count(&context.feature_id);
        assert_eq!(manager.retry_count(&context.feature_id, context.stage), 0);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(manager.error_history(None).len(), 1);
        assert!(manager.error_history(Some(future)).is_empty());
        assert_eq!(manager.sessions(None).len(), 1);

        assert_eq!(manager.prune_history(Duration::ZERO), 2);
        assert!(manager.error_history(None).is_empty());
    }
}
