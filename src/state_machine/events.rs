use serde::{Deserialize, Serialize};

/// Events that drive a lifecycle operation through its stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OperationEvent {
    /// Current stage finished without error
    StageSucceeded,
    /// Recovery decided the current stage may be skipped
    StageSkipped,
    /// Current stage failed with the given message
    StageFailed(String),
    /// Snapshot-based rollback completed
    RolledBack,
    /// Snapshot-based rollback did not fully succeed
    RollbackFailed(String),
}

impl OperationEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageSucceeded => "stage_succeeded",
            Self::StageSkipped => "stage_skipped",
            Self::StageFailed(_) => "stage_failed",
            Self::RolledBack => "rolled_back",
            Self::RollbackFailed(_) => "rollback_failed",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::StageFailed(msg) | Self::RollbackFailed(msg) => Some(msg),
            _ => None,
        }
    }
}
