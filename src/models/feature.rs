//! # Feature Models
//!
//! Identity, configuration and runtime state of a toggleable feature, plus the typed
//! dependency edges the graph is built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque feature identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl FeatureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for FeatureId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Dependency edge kinds. Only `Requires` constrains ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Requires,
    Conflicts,
    Enhances,
    DeprecatedBy,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requires => write!(f, "requires"),
            Self::Conflicts => write!(f, "conflicts"),
            Self::Enhances => write!(f, "enhances"),
            Self::DeprecatedBy => write!(f, "deprecated_by"),
        }
    }
}

/// A directed, typed edge from the owning feature to `target`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub target: FeatureId,
    pub kind: DependencyKind,
    #[serde(default)]
    pub version_constraint: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

impl DependencyEdge {
    pub fn new(target: impl Into<FeatureId>, kind: DependencyKind) -> Self {
        Self {
            target: target.into(),
            kind,
            version_constraint: None,
            optional: false,
        }
    }

    pub fn requires(target: impl Into<FeatureId>) -> Self {
        Self::new(target, DependencyKind::Requires)
    }

    pub fn conflicts(target: impl Into<FeatureId>) -> Self {
        Self::new(target, DependencyKind::Conflicts)
    }

    pub fn enhances(target: impl Into<FeatureId>) -> Self {
        Self::new(target, DependencyKind::Enhances)
    }

    pub fn deprecated_by(target: impl Into<FeatureId>) -> Self {
        Self::new(target, DependencyKind::DeprecatedBy)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_version(mut self, constraint: impl Into<String>) -> Self {
        self.version_constraint = Some(constraint.into());
        self
    }

    /// Whether this edge must be satisfied for the owner to run
    pub fn is_hard_requirement(&self) -> bool {
        self.kind == DependencyKind::Requires && !self.optional
    }
}

/// Broad classification of what a feature is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    Agent,
    Service,
    Algorithm,
    Monitor,
    #[default]
    Other,
}

/// Runtime enablement status of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Enabled,
    #[default]
    Disabled,
    /// Last lifecycle operation failed and was not rolled back
    Failed,
}

impl FeatureStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Static feature configuration as held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub feature_id: FeatureId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: FeatureCategory,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEdge>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl FeatureConfig {
    pub fn new(feature_id: impl Into<FeatureId>) -> Self {
        let feature_id = feature_id.into();
        Self {
            name: feature_id.to_string(),
            feature_id,
            description: None,
            category: FeatureCategory::default(),
            version: None,
            dependencies: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_category(mut self, category: FeatureCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_dependency(mut self, edge: DependencyEdge) -> Self {
        self.dependencies.push(edge);
        self
    }

    pub fn requires(self, target: impl Into<FeatureId>) -> Self {
        self.with_dependency(DependencyEdge::requires(target))
    }

    pub fn conflicts_with(self, target: impl Into<FeatureId>) -> Self {
        self.with_dependency(DependencyEdge::conflicts(target))
    }
}

/// Persisted runtime state of a feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureState {
    pub feature_id: FeatureId,
    pub status: FeatureStatus,
    #[serde(default)]
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureState {
    pub fn new(feature_id: FeatureId, status: FeatureStatus) -> Self {
        Self {
            feature_id,
            status,
            reason: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}
