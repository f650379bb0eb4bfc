//! # Lifecycle Orchestration
//!
//! Staged enable/disable of single features, bulk operations in resolved dependency
//! order, and the context that wires every component together.
//!
//! ## Core Components
//!
//! - **LifecycleOrchestrator**: runs one feature through its stage pipeline with
//!   recovery, rollback and per-feature exclusivity
//! - **Bulk operations**: `Atomic`, `Sequential` and `BestEffort` strategies over a
//!   resolved order
//! - **LifecycleContext**: owner of the graph registry, resolver, tracker, cleanup,
//!   recovery and event broadcaster
//! - **MaintenanceScheduler**: cache sweep, history retention and reference pruning

pub mod bulk;
pub mod context;
pub mod maintenance;
pub mod orchestrator;

pub use bulk::{BulkFailure, BulkOperationResult, BulkStrategy};
pub use context::{LifecycleContext, LifecycleContextBuilder};
pub use maintenance::{MaintenanceJob, MaintenanceJobs, MaintenanceScheduler, PeriodicTask};
pub use orchestrator::{LifecycleOrchestrator, OperationOptions, OperationOutcome};
