//! # Feature Graph
//!
//! Dependency graph storage, the resolver algorithms that run over it, a TTL cache for
//! resolution results and the registry that swaps whole graphs on feature-set changes.

pub mod cache;
pub mod dependency_graph;
pub mod registry;
pub mod resolver;

pub use cache::{CacheKey, CacheStats, ResolutionCache, ResolveOperation};
pub use dependency_graph::DependencyGraph;
pub use registry::FeatureGraphRegistry;
pub use resolver::{
    DependencyResolver, FeatureConflict, FeatureImpact, FeatureValidation, ImpactEntry,
    MissingDependency, ResolutionResult,
};
