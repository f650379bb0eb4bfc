#![allow(clippy::doc_markdown)] // Allow technical terms in docs without backticks
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Feature Lifecycle
//!
//! Orchestration engine for enabling and disabling interdependent features of a
//! long-running host.
//!
//! ## Overview
//!
//! Features declare dependencies on each other (hard requirements, optional
//! enhancements, mutual conflicts). The engine resolves a safe order for any set of
//! features, drives each one through a staged activation or deactivation pipeline,
//! releases the resources it owned, recovers from stage failures and broadcasts
//! progress to subscribers.
//!
//! ## Module Organization
//!
//! - [`graph`] - Dependency graph, resolver and resolution cache
//! - [`state_machine`] - Operation kinds, stages and the operation record
//! - [`resources`] - Resource tracking, snapshots and staged cleanup
//! - [`recovery`] - Failure classification, backoff and recovery actions
//! - [`events`] - Filtered event broadcasting and progress tracking
//! - [`orchestration`] - Single and bulk lifecycle operations, context and maintenance
//! - [`collaborators`] - Traits for the host services the engine drives
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use feature_lifecycle::models::{FeatureConfig, FeatureId};
//! use feature_lifecycle::orchestration::{LifecycleContext, OperationOptions};
//!
//! # async fn example() -> feature_lifecycle::LifecycleResult<()> {
//! feature_lifecycle::logging::init_structured_logging();
//!
//! let context = LifecycleContext::builder().build().await?;
//! context.register_feature(FeatureConfig::new("market_data")).await?;
//!
//! let outcome = context
//!     .enable_feature(&FeatureId::from("market_data"), &OperationOptions::new())
//!     .await?;
//! assert!(outcome.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod recovery;
pub mod resources;
pub mod state_machine;
pub mod utils;

pub use config::{ConfigManager, LifecycleConfig};
pub use error::{LifecycleError, LifecycleResult};
pub use events::{BroadcastEvent, EventBroadcaster, EventKind, Subscription};
pub use graph::{DependencyGraph, DependencyResolver, ResolutionResult};
pub use models::{DependencyEdge, DependencyKind, FeatureConfig, FeatureId, FeatureStatus};
pub use orchestration::{
    BulkStrategy, LifecycleContext, LifecycleOrchestrator, OperationOptions, OperationOutcome,
};
pub use state_machine::{LifecycleOperation, LifecycleStage, OperationKind, OperationStatus};
