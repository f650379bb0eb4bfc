//! Event, subscription and progress records for the broadcaster.

use crate::models::FeatureId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Lifecycle milestones published to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DeactivationStarted,
    DeactivationProgress,
    DeactivationCompleted,
    DeactivationFailed,
    ActivationStarted,
    ActivationCompleted,
    ActivationFailed,
    RecoveryStarted,
    RecoveryCompleted,
    CleanupStarted,
    CleanupCompleted,
    RollbackCompleted,
    FeatureStateChanged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeactivationStarted => "deactivation_started",
            Self::DeactivationProgress => "deactivation_progress",
            Self::DeactivationCompleted => "deactivation_completed",
            Self::DeactivationFailed => "deactivation_failed",
            Self::ActivationStarted => "activation_started",
            Self::ActivationCompleted => "activation_completed",
            Self::ActivationFailed => "activation_failed",
            Self::RecoveryStarted => "recovery_started",
            Self::RecoveryCompleted => "recovery_completed",
            Self::CleanupStarted => "cleanup_started",
            Self::CleanupCompleted => "cleanup_completed",
            Self::RollbackCompleted => "rollback_completed",
            Self::FeatureStateChanged => "feature_state_changed",
        }
    }

    /// Terminal milestones that are also forwarded to the system event bus
    pub fn is_forwarded(&self) -> bool {
        matches!(
            self,
            Self::DeactivationCompleted
                | Self::DeactivationFailed
                | Self::ActivationCompleted
                | Self::ActivationFailed
                | Self::RecoveryCompleted
                | Self::FeatureStateChanged
        )
    }

    /// Topic used on the system event bus
    pub fn system_topic(&self) -> String {
        format!("feature.{}", self.as_str())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub feature_id: Option<FeatureId>,
    pub severity: EventSeverity,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<String>,
}

impl BroadcastEvent {
    pub fn new(kind: EventKind, feature_id: Option<FeatureId>, severity: EventSeverity) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            feature_id,
            severity,
            data: Value::Null,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Filter attached to a subscriber.
///
/// An empty kind set accepts every kind; `feature_filter: None` accepts every feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber_id: String,
    pub event_kinds: BTreeSet<EventKind>,
    pub feature_filter: Option<BTreeSet<FeatureId>>,
    pub min_severity: EventSeverity,
}

impl Subscription {
    pub fn new(subscriber_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscriber_id: subscriber_id.into(),
            event_kinds: BTreeSet::new(),
            feature_filter: None,
            min_severity: EventSeverity::Debug,
        }
    }

    pub fn for_kinds<I: IntoIterator<Item = EventKind>>(mut self, kinds: I) -> Self {
        self.event_kinds.extend(kinds);
        self
    }

    pub fn for_features<I, F>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FeatureId>,
    {
        self.feature_filter = Some(features.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_min_severity(mut self, severity: EventSeverity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn matches(&self, event: &BroadcastEvent) -> bool {
        if !self.event_kinds.is_empty() && !self.event_kinds.contains(&event.kind) {
            return false;
        }
        if event.severity < self.min_severity {
            return false;
        }
        match (&self.feature_filter, &event.feature_id) {
            (None, _) => true,
            (Some(allowed), Some(feature_id)) => allowed.contains(feature_id),
            // Feature-scoped subscriptions ignore events without a feature
            (Some(_), None) => false,
        }
    }
}

/// History query; every unset field matches everything
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub kinds: Option<BTreeSet<EventKind>>,
    pub feature_id: Option<FeatureId>,
    pub since: Option<DateTime<Utc>>,
    pub min_severity: Option<EventSeverity>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kinds.get_or_insert_with(BTreeSet::new).insert(kind);
        self
    }

    pub fn feature(mut self, feature_id: impl Into<FeatureId>) -> Self {
        self.feature_id = Some(feature_id.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn min_severity(mut self, severity: EventSeverity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Keep only the most recent `limit` matches
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &BroadcastEvent) -> bool {
        self.kinds.as_ref().map_or(true, |k| k.contains(&event.kind))
            && self
                .feature_id
                .as_ref()
                .map_or(true, |id| event.feature_id.as_ref() == Some(id))
            && self.since.map_or(true, |since| event.timestamp >= since)
            && self.min_severity.map_or(true, |min| event.severity >= min)
    }
}

/// Named, pollable progress of a long-running operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressOperation {
    pub operation_id: String,
    pub feature_id: Option<FeatureId>,
    pub stage: Option<String>,
    pub percentage: f32,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed: bool,
    pub success: Option<bool>,
}

impl ProgressOperation {
    pub(crate) fn new(operation_id: String, feature_id: Option<FeatureId>, message: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            operation_id,
            feature_id,
            stage: None,
            percentage: 0.0,
            message,
            started_at: now,
            updated_at: now,
            completed: false,
            success: None,
        }
    }
}
