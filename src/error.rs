//! Error types for the feature lifecycle engine.
//!

use crate::models::FeatureId;
use crate::recovery::ErrorCategory;
use crate::state_machine::{LifecycleStage, StateMachineError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Missing dependency: {feature_id} requires unregistered feature {dependency}")]
    MissingDependency {
        feature_id: FeatureId,
        dependency: FeatureId,
    },

    #[error("Circular dependency detected: {}", format_cycle(.cycle))]
    CircularDependency { cycle: Vec<FeatureId> },

    #[error("Conflict detected between {first} and {second}")]
    ConflictDetected { first: FeatureId, second: FeatureId },

    #[error("Operation {operation} timed out after {timeout:?}")]
    OperationTimeout { operation: String, timeout: Duration },

    #[error("Stage {stage} failed ({category}): {message}")]
    StageFailure {
        stage: LifecycleStage,
        category: ErrorCategory,
        message: String,
    },

    #[error("Rollback failed for {feature_id}: {reason}")]
    RollbackFailure { feature_id: FeatureId, reason: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(FeatureId),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),
}

impl LifecycleError {
    /// Wrap a collaborator failure, keeping the full error chain in the message
    pub fn collaborator(error: &anyhow::Error) -> Self {
        Self::Collaborator(format!("{error:#}"))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::OperationTimeout { .. })
    }
}

fn format_cycle(cycle: &[FeatureId]) -> String {
    let mut rendered: Vec<String> = cycle.iter().map(ToString::to_string).collect();
    if let Some(first) = cycle.first() {
        rendered.push(first.to_string());
    }
    rendered.join(" -> ")
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_dependency_message_closes_the_loop() {
        let err = LifecycleError::CircularDependency {
            cycle: vec![FeatureId::from("a"), FeatureId::from("b")],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
    }

    #[test]
    fn test_timeout_predicate() {
        let err = LifecycleError::OperationTimeout {
            operation: "deactivate:a".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(err.is_timeout());
        assert!(!LifecycleError::Configuration("x".to_string()).is_timeout());
    }
}
