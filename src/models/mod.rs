//! # Models
//!
//! Plain data types shared by every component: feature identity/configuration/state,
//! dependency edges, resource bindings and audit records.

pub mod audit;
pub mod feature;
pub mod resources;

pub use audit::{AuditAction, AuditEntry};
pub use feature::{
    DependencyEdge, DependencyKind, FeatureCategory, FeatureConfig, FeatureId, FeatureState,
    FeatureStatus,
};
pub use resources::{ResourceBindings, ResourceKind};
