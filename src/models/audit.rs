use super::feature::{FeatureId, FeatureStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of change recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Enable,
    Disable,
    Rollback,
    ForceCleanup,
    Register,
    Unregister,
}

/// One audit record handed to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub feature_id: FeatureId,
    pub action: AuditAction,
    pub old_state: Option<FeatureStatus>,
    pub new_state: Option<FeatureStatus>,
    pub reason: Option<String>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(feature_id: FeatureId, action: AuditAction, actor: impl Into<String>) -> Self {
        Self {
            feature_id,
            action,
            old_state: None,
            new_state: None,
            reason: None,
            actor: actor.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn transition(mut self, old: Option<FeatureStatus>, new: Option<FeatureStatus>) -> Self {
        self.old_state = old;
        self.new_state = new;
        self
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}
