use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::ResourceKind;

/// Stages of the lifecycle pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    /// Snapshot resources and identify what the feature owns
    Preparation,
    /// Stop scheduled tasks bound to the feature
    StoppingTasks,
    /// Stop agents bound to the feature
    StoppingAgents,
    /// Stop services bound to the feature
    StoppingServices,
    /// Release tracked resources
    CleanupResources,
    /// Persist the final state and clear tracking
    Finalization,
    /// Operation finished successfully
    Completed,
    /// Operation failed
    Failed,
}

impl LifecycleStage {
    /// Stages a deactivation walks through, in order
    pub const DEACTIVATION: [LifecycleStage; 6] = [
        Self::Preparation,
        Self::StoppingTasks,
        Self::StoppingAgents,
        Self::StoppingServices,
        Self::CleanupResources,
        Self::Finalization,
    ];

    /// Activation is unstaged apart from its bookends
    pub const ACTIVATION: [LifecycleStage; 2] = [Self::Preparation, Self::Finalization];

    /// Check if this is a terminal stage (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stages that may be skipped by recovery without leaving anything running
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::CleanupResources)
    }

    /// Resource kind stopped by this stage, if any
    pub fn stopped_kind(&self) -> Option<ResourceKind> {
        match self {
            Self::StoppingTasks => Some(ResourceKind::Task),
            Self::StoppingAgents => Some(ResourceKind::Agent),
            Self::StoppingServices => Some(ResourceKind::Service),
            _ => None,
        }
    }

    /// Whether this stage changes external state
    pub fn mutates_resources(&self) -> bool {
        matches!(
            self,
            Self::StoppingTasks
                | Self::StoppingAgents
                | Self::StoppingServices
                | Self::CleanupResources
                | Self::Finalization
        )
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preparation => write!(f, "preparation"),
            Self::StoppingTasks => write!(f, "stopping_tasks"),
            Self::StoppingAgents => write!(f, "stopping_agents"),
            Self::StoppingServices => write!(f, "stopping_services"),
            Self::CleanupResources => write!(f, "cleanup_resources"),
            Self::Finalization => write!(f, "finalization"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for LifecycleStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparation" => Ok(Self::Preparation),
            "stopping_tasks" => Ok(Self::StoppingTasks),
            "stopping_agents" => Ok(Self::StoppingAgents),
            "stopping_services" => Ok(Self::StoppingServices),
            "cleanup_resources" => Ok(Self::CleanupResources),
            "finalization" => Ok(Self::Finalization),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid lifecycle stage: {s}")),
        }
    }
}

/// Overall status of a lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    /// Failed and the rollback itself did not fully succeed
    Partial,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Partial)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

/// Direction of a lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Enable,
    Disable,
}

impl OperationKind {
    pub fn pipeline(&self) -> &'static [LifecycleStage] {
        match self {
            Self::Enable => &LifecycleStage::ACTIVATION,
            Self::Disable => &LifecycleStage::DEACTIVATION,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enable => write!(f, "enable"),
            Self::Disable => write!(f, "disable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_terminal_check() {
        assert!(LifecycleStage::Completed.is_terminal());
        assert!(LifecycleStage::Failed.is_terminal());
        for stage in LifecycleStage::DEACTIVATION {
            assert!(!stage.is_terminal());
        }
    }

    #[test]
    fn test_stage_string_conversion() {
        assert_eq!(LifecycleStage::StoppingAgents.to_string(), "stopping_agents");
        assert_eq!(
            "cleanup_resources".parse::<LifecycleStage>().unwrap(),
            LifecycleStage::CleanupResources
        );
        assert!("bogus".parse::<LifecycleStage>().is_err());
    }

    #[test]
    fn test_stopped_kind_mapping() {
        assert_eq!(
            LifecycleStage::StoppingServices.stopped_kind(),
            Some(ResourceKind::Service)
        );
        assert_eq!(LifecycleStage::Preparation.stopped_kind(), None);
        assert!(!LifecycleStage::Preparation.mutates_resources());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&OperationStatus::Partial).unwrap();
        assert_eq!(json, "\"partial\"");
        let parsed: LifecycleStage = serde_json::from_str("\"stopping_tasks\"").unwrap();
        assert_eq!(parsed, LifecycleStage::StoppingTasks);
    }
}
