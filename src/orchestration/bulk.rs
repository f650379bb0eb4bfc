//! Multi-feature enable/disable in resolved dependency order.
//!
//! - `Atomic`: the first failure stops the run. The failing feature is always rolled
//!   back; features already processed keep their new state.
//! - `Sequential`: the first failure stops the run; rollback follows the request options.
//! - `BestEffort`: every feature is attempted. Features are grouped into dependency
//!   waves and each wave runs concurrently up to the given limit.

use super::orchestrator::{LifecycleOrchestrator, OperationOptions, OperationOutcome};
use crate::error::LifecycleResult;
use crate::graph::{DependencyGraph, ResolutionResult};
use crate::models::{DependencyKind, FeatureId};
use crate::state_machine::OperationKind;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStrategy {
    Atomic,
    #[default]
    Sequential,
    BestEffort,
}

impl fmt::Display for BulkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atomic => write!(f, "atomic"),
            Self::Sequential => write!(f, "sequential"),
            Self::BestEffort => write!(f, "best_effort"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub feature_id: FeatureId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkOperationResult {
    pub kind: OperationKind,
    pub strategy: BulkStrategy,
    pub resolution: ResolutionResult,
    /// Outcomes in the order features were processed
    pub outcomes: Vec<OperationOutcome>,
    pub failures: Vec<BulkFailure>,
    /// Features never attempted because the run stopped early
    pub skipped: Vec<FeatureId>,
    pub success: bool,
}

impl BulkOperationResult {
    fn unresolved(kind: OperationKind, strategy: BulkStrategy, resolution: ResolutionResult) -> Self {
        let missing = resolution.missing_dependencies.iter().map(|missing| BulkFailure {
            feature_id: missing
                .required_by
                .clone()
                .unwrap_or_else(|| missing.dependency.clone()),
            message: format!("missing dependency {}", missing.dependency),
        });
        let cycles = resolution
            .circular_dependencies
            .iter()
            .filter_map(|cycle| cycle.first().map(|first| (first, cycle)))
            .map(|(first, cycle)| BulkFailure {
                feature_id: first.clone(),
                message: format!(
                    "circular dependency: {}",
                    cycle.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
                ),
            });
        let failures = missing.chain(cycles).collect();
        Self {
            kind,
            strategy,
            skipped: resolution.order.clone(),
            resolution,
            outcomes: Vec::new(),
            failures,
            success: false,
        }
    }

    /// Features whose operation finished in the requested state
    pub fn succeeded_features(&self) -> Vec<FeatureId> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_success())
            .map(|outcome| outcome.feature_id().clone())
            .collect()
    }
}

impl LifecycleOrchestrator {
    /// Enable `ids`, pulling in hard dependencies when `include_dependencies` is set
    #[instrument(skip(self, ids, options), fields(features = ids.len(), %strategy))]
    pub async fn enable_features(
        &self,
        ids: &[FeatureId],
        include_dependencies: bool,
        strategy: BulkStrategy,
        concurrency: usize,
        options: &OperationOptions,
    ) -> BulkOperationResult {
        let graph = self.graphs().snapshot();
        let resolution = self
            .resolver()
            .resolve_enable_order(&graph, ids, include_dependencies);
        self.run_bulk(OperationKind::Enable, &graph, resolution, strategy, concurrency, options)
            .await
    }

    /// Disable `ids`, unwinding dependents first when `cascade` is set
    #[instrument(skip(self, ids, options), fields(features = ids.len(), %strategy))]
    pub async fn disable_features(
        &self,
        ids: &[FeatureId],
        cascade: bool,
        strategy: BulkStrategy,
        concurrency: usize,
        options: &OperationOptions,
    ) -> BulkOperationResult {
        let graph = self.graphs().snapshot();
        let resolution = self.resolver().resolve_disable_order(&graph, ids, cascade);
        self.run_bulk(OperationKind::Disable, &graph, resolution, strategy, concurrency, options)
            .await
    }

    async fn run_bulk(
        &self,
        kind: OperationKind,
        graph: &DependencyGraph,
        resolution: ResolutionResult,
        strategy: BulkStrategy,
        concurrency: usize,
        options: &OperationOptions,
    ) -> BulkOperationResult {
        if !resolution.success {
            warn!(%kind, errors = ?resolution.errors(), "Bulk operation rejected by resolver");
            return BulkOperationResult::unresolved(kind, strategy, resolution);
        }
        for warning in &resolution.warnings {
            warn!(%kind, warning = %warning, "Resolution warning");
        }

        let mut result = BulkOperationResult {
            kind,
            strategy,
            resolution,
            outcomes: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            success: true,
        };
        let order = result.resolution.order.clone();

        match strategy {
            BulkStrategy::Atomic | BulkStrategy::Sequential => {
                let mut options = options.clone();
                if strategy == BulkStrategy::Atomic {
                    options.rollback_on_failure = true;
                }
                for (index, feature_id) in order.iter().enumerate() {
                    let succeeded = self.record(&mut result, feature_id, kind, &options).await;
                    if !succeeded {
                        result.skipped = order[index + 1..].to_vec();
                        break;
                    }
                }
            }
            BulkStrategy::BestEffort => {
                let limit = concurrency.max(1);
                for wave in waves(graph, &order) {
                    let mut finished: Vec<(usize, FeatureId, _)> = stream::iter(wave)
                        .map(|index| {
                            let feature_id = order[index].clone();
                            async move {
                                let outcome = self.run_single(kind, &feature_id, options).await;
                                (index, feature_id, outcome)
                            }
                        })
                        .buffer_unordered(limit)
                        .collect()
                        .await;
                    finished.sort_by_key(|(index, _, _)| *index);
                    for (_, feature_id, outcome) in finished {
                        Self::absorb(&mut result, feature_id, outcome);
                    }
                }
            }
        }

        result.success = result.failures.is_empty() && result.skipped.is_empty();
        info!(
            %kind,
            %strategy,
            processed = result.outcomes.len(),
            failed = result.failures.len(),
            skipped = result.skipped.len(),
            "Bulk operation finished"
        );
        result
    }

    async fn record(
        &self,
        result: &mut BulkOperationResult,
        feature_id: &FeatureId,
        kind: OperationKind,
        options: &OperationOptions,
    ) -> bool {
        let outcome = self.run_single(kind, feature_id, options).await;
        Self::absorb(result, feature_id.clone(), outcome)
    }

    fn absorb(
        result: &mut BulkOperationResult,
        feature_id: FeatureId,
        outcome: LifecycleResult<OperationOutcome>,
    ) -> bool {
        match outcome {
            Ok(outcome) => {
                let succeeded = outcome.is_success();
                if !succeeded {
                    let message = outcome
                        .operation()
                        .and_then(|op| op.error_message.clone())
                        .unwrap_or_else(|| "operation failed".to_string());
                    result.failures.push(BulkFailure {
                        feature_id,
                        message,
                    });
                }
                result.outcomes.push(outcome);
                succeeded
            }
            Err(error) => {
                result.failures.push(BulkFailure {
                    feature_id,
                    message: error.to_string(),
                });
                false
            }
        }
    }
}

/// Group positions of a topologically ordered list into waves with no `Requires`
/// edge inside any wave. Every feature lands one wave after the latest related
/// feature that precedes it.
fn waves(graph: &DependencyGraph, order: &[FeatureId]) -> Vec<Vec<usize>> {
    let position: HashMap<&FeatureId, usize> =
        order.iter().enumerate().map(|(i, id)| (id, i)).collect();
    let mut level = vec![0usize; order.len()];

    for (index, feature_id) in order.iter().enumerate() {
        let related = graph
            .get_dependencies(feature_id)
            .iter()
            .filter(|edge| edge.kind == DependencyKind::Requires)
            .map(|edge| edge.target.clone())
            .chain(graph.get_dependents(feature_id));
        let wave = related
            .filter_map(|other| position.get(&other).copied())
            .filter(|&other| other < index)
            .map(|other| level[other] + 1)
            .max()
            .unwrap_or(0);
        level[index] = wave;
    }

    let depth = level.iter().max().map_or(0, |max| max + 1);
    let mut grouped = vec![Vec::new(); depth];
    for (index, wave) in level.into_iter().enumerate() {
        grouped[wave].push(index);
    }
    grouped
}
