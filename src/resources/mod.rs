//! # Resources
//!
//! Tracking of what each feature holds and the staged cleanup that releases it.

pub mod cleanup;
pub mod tracker;

pub use cleanup::{CleanupManager, CleanupReport, CleanupStage, ForceCleanupReport, StageReport};
pub use tracker::{FeatureResources, ResourceSnapshot, ResourceTracker, SharedObject};
