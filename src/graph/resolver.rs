//! # Dependency Resolver
//!
//! Stateless algorithms over a [`DependencyGraph`] snapshot: enable/disable ordering,
//! cycle and conflict detection, state validation and impact analysis.
//!
//! Ordering uses Kahn's algorithm over `Requires` edges inside the expanded set. Ties
//! are broken by the caller's input order, then by discovery order for features pulled
//! in by expansion, so identical inputs always produce identical orders.

use super::cache::{CacheKey, ResolutionCache, ResolveOperation};
use super::dependency_graph::DependencyGraph;
use crate::error::LifecycleError;
use crate::models::{DependencyKind, FeatureId, FeatureStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

/// A hard dependency that does not resolve to a registered feature.
///
/// `required_by` is `None` when the caller asked for the unknown feature directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDependency {
    pub required_by: Option<FeatureId>,
    pub dependency: FeatureId,
}

/// Unordered conflicting pair; `first` sorts before `second`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureConflict {
    pub first: FeatureId,
    pub second: FeatureId,
}

impl FeatureConflict {
    fn new(a: &FeatureId, b: &FeatureId) -> Self {
        if a <= b {
            Self {
                first: a.clone(),
                second: b.clone(),
            }
        } else {
            Self {
                first: b.clone(),
                second: a.clone(),
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub success: bool,
    pub order: Vec<FeatureId>,
    pub conflicts: Vec<FeatureConflict>,
    pub missing_dependencies: Vec<MissingDependency>,
    pub circular_dependencies: Vec<Vec<FeatureId>>,
    pub warnings: Vec<String>,
}

impl ResolutionResult {
    /// Fatal problems expressed in the crate error taxonomy
    pub fn errors(&self) -> Vec<LifecycleError> {
        let missing = self.missing_dependencies.iter().map(|missing| {
            LifecycleError::MissingDependency {
                feature_id: missing
                    .required_by
                    .clone()
                    .unwrap_or_else(|| missing.dependency.clone()),
                dependency: missing.dependency.clone(),
            }
        });
        let cycles = self
            .circular_dependencies
            .iter()
            .map(|cycle| LifecycleError::CircularDependency {
                cycle: cycle.clone(),
            });
        missing.chain(cycles).collect()
    }

    /// First fatal problem, if resolution failed
    pub fn into_error(self) -> Option<LifecycleError> {
        if self.success {
            return None;
        }
        self.errors().into_iter().next()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureValidation {
    pub feature_id: FeatureId,
    pub status: FeatureStatus,
    pub valid: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactEntry {
    pub feature_id: FeatureId,
    pub kind: DependencyKind,
    pub optional: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureImpact {
    pub feature_id: FeatureId,
    pub enabled: bool,
    pub dependencies: Vec<ImpactEntry>,
    pub dependents: Vec<ImpactEntry>,
    pub conflicts: Vec<ImpactEntry>,
    pub impact_score: u32,
}

#[derive(Debug, Default)]
pub struct DependencyResolver {
    cache: Option<ResolutionCache>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self { cache: None }
    }

    pub fn with_cache(ttl: Duration) -> Self {
        Self {
            cache: Some(ResolutionCache::new(ttl)),
        }
    }

    pub fn cache(&self) -> Option<&ResolutionCache> {
        self.cache.as_ref()
    }

    /// Evict expired cache entries
    pub fn sweep_cache(&self) -> usize {
        self.cache.as_ref().map(ResolutionCache::sweep).unwrap_or(0)
    }

    pub fn resolve_enable_order(
        &self,
        graph: &DependencyGraph,
        ids: &[FeatureId],
        include_dependencies: bool,
    ) -> ResolutionResult {
        self.cached(graph, ResolveOperation::Enable, ids, include_dependencies, || {
            resolve_enable(graph, ids, include_dependencies)
        })
    }

    pub fn resolve_disable_order(
        &self,
        graph: &DependencyGraph,
        ids: &[FeatureId],
        cascade: bool,
    ) -> ResolutionResult {
        self.cached(graph, ResolveOperation::Disable, ids, cascade, || {
            resolve_disable(graph, ids, cascade)
        })
    }

    fn cached<F>(
        &self,
        graph: &DependencyGraph,
        operation: ResolveOperation,
        ids: &[FeatureId],
        flag: bool,
        resolve: F,
    ) -> ResolutionResult
    where
        F: FnOnce() -> ResolutionResult,
    {
        let Some(cache) = &self.cache else {
            return resolve();
        };
        let key = CacheKey {
            operation,
            ids: dedupe(ids),
            flag,
            graph_hash: graph.content_hash(),
        };
        if let Some(result) = cache.get(&key) {
            debug!(?operation, features = key.ids.len(), "resolution cache hit");
            return result;
        }
        let result = resolve();
        cache.insert(key, result.clone());
        result
    }

    /// Check one feature's status against the status of its neighbours
    pub fn validate_feature_state(
        &self,
        graph: &DependencyGraph,
        feature_id: &FeatureId,
        states: &HashMap<FeatureId, FeatureStatus>,
    ) -> FeatureValidation {
        let status = status_of(states, feature_id);
        let mut warnings = Vec::new();

        if !graph.contains(feature_id) {
            warnings.push(format!("feature {feature_id} is not registered"));
        } else if status.is_enabled() {
            for edge in graph
                .get_dependencies(feature_id)
                .iter()
                .filter(|edge| edge.is_hard_requirement())
            {
                if !status_of(states, &edge.target).is_enabled() {
                    warnings.push(format!(
                        "required dependency {} is disabled while {feature_id} is enabled",
                        edge.target
                    ));
                }
            }
            for partner in graph.conflict_partners(feature_id) {
                if status_of(states, &partner).is_enabled() {
                    warnings.push(format!(
                        "conflicting feature {partner} is enabled while {feature_id} is enabled"
                    ));
                }
            }
        } else {
            for dependent in graph.get_dependents(feature_id) {
                if status_of(states, &dependent).is_enabled() {
                    warnings.push(format!(
                        "dependent {dependent} is enabled while {feature_id} is disabled"
                    ));
                }
            }
        }

        FeatureValidation {
            feature_id: feature_id.clone(),
            status,
            valid: warnings.is_empty(),
            warnings,
        }
    }

    /// Dependencies, dependents and conflicts of a feature with a weighted score
    pub fn get_feature_impact(
        &self,
        graph: &DependencyGraph,
        feature_id: &FeatureId,
        states: &HashMap<FeatureId, FeatureStatus>,
    ) -> FeatureImpact {
        let dependencies: Vec<ImpactEntry> = graph
            .get_dependencies(feature_id)
            .iter()
            .filter(|edge| edge.kind == DependencyKind::Requires)
            .map(|edge| ImpactEntry {
                feature_id: edge.target.clone(),
                kind: edge.kind,
                optional: edge.optional,
                enabled: status_of(states, &edge.target).is_enabled(),
            })
            .collect();

        let dependents: Vec<ImpactEntry> = graph
            .get_dependents(feature_id)
            .into_iter()
            .map(|dependent| {
                let optional = graph
                    .get_dependencies(&dependent)
                    .iter()
                    .filter(|edge| edge.kind == DependencyKind::Requires && &edge.target == feature_id)
                    .all(|edge| edge.optional);
                ImpactEntry {
                    enabled: status_of(states, &dependent).is_enabled(),
                    feature_id: dependent,
                    kind: DependencyKind::Requires,
                    optional,
                }
            })
            .collect();

        let conflicts: Vec<ImpactEntry> = graph
            .conflict_partners(feature_id)
            .into_iter()
            .map(|partner| ImpactEntry {
                enabled: status_of(states, &partner).is_enabled(),
                feature_id: partner,
                kind: DependencyKind::Conflicts,
                optional: false,
            })
            .collect();

        let impact_score =
            (dependencies.len() + 2 * dependents.len() + 3 * conflicts.len()) as u32;

        FeatureImpact {
            feature_id: feature_id.clone(),
            enabled: status_of(states, feature_id).is_enabled(),
            dependencies,
            dependents,
            conflicts,
            impact_score,
        }
    }
}

fn status_of(states: &HashMap<FeatureId, FeatureStatus>, id: &FeatureId) -> FeatureStatus {
    states.get(id).copied().unwrap_or_default()
}

fn dedupe(ids: &[FeatureId]) -> Vec<FeatureId> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

/// Ordered working set; position doubles as tie-break priority
#[derive(Default)]
struct Scope {
    members: Vec<FeatureId>,
    index: HashMap<FeatureId, usize>,
}

impl Scope {
    fn push(&mut self, id: FeatureId) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        self.index.insert(id.clone(), self.members.len());
        self.members.push(id);
        true
    }

    fn contains(&self, id: &FeatureId) -> bool {
        self.index.contains_key(id)
    }
}

fn seed_scope(graph: &DependencyGraph, ids: &[FeatureId], result: &mut ResolutionResult) -> Scope {
    let mut scope = Scope::default();
    for id in dedupe(ids) {
        if graph.contains(&id) {
            scope.push(id);
        } else {
            result.missing_dependencies.push(MissingDependency {
                required_by: None,
                dependency: id,
            });
        }
    }
    scope
}

fn resolve_enable(
    graph: &DependencyGraph,
    ids: &[FeatureId],
    include_dependencies: bool,
) -> ResolutionResult {
    let mut result = ResolutionResult::default();
    let mut scope = seed_scope(graph, ids, &mut result);

    // Breadth-first over hard requirements; scope grows while we walk it
    let mut cursor = 0;
    while cursor < scope.members.len() {
        let current = scope.members[cursor].clone();
        cursor += 1;
        for edge in graph
            .get_dependencies(&current)
            .iter()
            .filter(|edge| edge.kind == DependencyKind::Requires)
        {
            if edge.optional {
                if !graph.contains(&edge.target) {
                    result.warnings.push(format!(
                        "optional dependency {} of {current} is not registered",
                        edge.target
                    ));
                }
                continue;
            }
            if !graph.contains(&edge.target) {
                result.missing_dependencies.push(MissingDependency {
                    required_by: Some(current.clone()),
                    dependency: edge.target.clone(),
                });
            } else if include_dependencies {
                scope.push(edge.target.clone());
            }
        }
    }

    finish(graph, scope, result, false)
}

fn resolve_disable(graph: &DependencyGraph, ids: &[FeatureId], cascade: bool) -> ResolutionResult {
    let mut result = ResolutionResult::default();
    let mut scope = seed_scope(graph, ids, &mut result);

    if cascade {
        let mut cursor = 0;
        while cursor < scope.members.len() {
            let current = scope.members[cursor].clone();
            cursor += 1;
            for dependent in graph.get_dependents(&current) {
                scope.push(dependent);
            }
        }
    }

    finish(graph, scope, result, true)
}

fn finish(
    graph: &DependencyGraph,
    scope: Scope,
    mut result: ResolutionResult,
    reverse: bool,
) -> ResolutionResult {
    for cycle in graph.find_cycles() {
        if cycle.iter().any(|id| scope.contains(id)) {
            result.circular_dependencies.push(cycle);
        } else {
            result.warnings.push(format!(
                "cycle outside the requested features: {}",
                render_cycle(&cycle)
            ));
        }
    }
    if !result.circular_dependencies.is_empty() {
        result.success = false;
        return result;
    }

    let mut seen_conflicts = HashSet::new();
    for member in &scope.members {
        for edge in graph
            .get_dependencies(member)
            .iter()
            .filter(|edge| edge.kind == DependencyKind::Conflicts && scope.contains(&edge.target))
        {
            let conflict = FeatureConflict::new(member, &edge.target);
            if seen_conflicts.insert(conflict.clone()) {
                result.warnings.push(format!(
                    "{} conflicts with {}",
                    conflict.first, conflict.second
                ));
                result.conflicts.push(conflict);
            }
        }
    }

    match topological_order(graph, &scope) {
        Ok(mut order) => {
            if reverse {
                order.reverse();
            }
            result.order = order;
        }
        Err(leftover) => {
            let stuck: HashSet<FeatureId> = leftover.iter().cloned().collect();
            let cycles = graph.find_cycles_within(|id| stuck.contains(id));
            if cycles.is_empty() {
                result.circular_dependencies.push(leftover);
            } else {
                result.circular_dependencies.extend(cycles);
            }
        }
    }

    result.success =
        result.missing_dependencies.is_empty() && result.circular_dependencies.is_empty();
    result
}

/// Kahn's algorithm restricted to `Requires` edges inside the scope.
///
/// Returns the unconsumed nodes when the sort stalls.
fn topological_order(graph: &DependencyGraph, scope: &Scope) -> Result<Vec<FeatureId>, Vec<FeatureId>> {
    let size = scope.members.len();
    let mut in_degree = vec![0usize; size];
    let mut unlocks: Vec<Vec<usize>> = vec![Vec::new(); size];

    for (idx, member) in scope.members.iter().enumerate() {
        for target in graph.required_targets(member) {
            if let Some(&target_idx) = scope.index.get(target) {
                unlocks[target_idx].push(idx);
                in_degree[idx] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..size).filter(|idx| in_degree[*idx] == 0).collect();
    let mut order = Vec::with_capacity(size);

    while let Some(next) = ready.pop_first() {
        order.push(scope.members[next].clone());
        for &dependent in &unlocks[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() == size {
        Ok(order)
    } else {
        Err(scope
            .members
            .iter()
            .enumerate()
            .filter(|(idx, _)| in_degree[*idx] > 0)
            .map(|(_, id)| id.clone())
            .collect())
    }
}

fn render_cycle(cycle: &[FeatureId]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(FeatureId::as_str).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DependencyEdge, FeatureConfig};

    fn id(s: &str) -> FeatureId {
        FeatureId::from(s)
    }

    fn ids(list: &[&str]) -> Vec<FeatureId> {
        list.iter().map(|s| id(s)).collect()
    }

    fn chain_graph() -> DependencyGraph {
        // app -> api -> db
        DependencyGraph::from_features(&[
            FeatureConfig::new("db"),
            FeatureConfig::new("api").requires("db"),
            FeatureConfig::new("app").requires("api"),
        ])
    }

    #[test]
    fn test_enable_order_puts_dependencies_first() {
        let resolver = DependencyResolver::new();
        let result = resolver.resolve_enable_order(&chain_graph(), &ids(&["app"]), true);
        assert!(result.success);
        assert_eq!(result.order, ids(&["db", "api", "app"]));
    }

    #[test]
    fn test_enable_without_expansion_keeps_request_only() {
        let resolver = DependencyResolver::new();
        let result = resolver.resolve_enable_order(&chain_graph(), &ids(&["app", "db"]), false);
        assert!(result.success);
        assert_eq!(result.order, ids(&["app", "db"]));
    }

    #[test]
    fn test_ties_follow_input_order() {
        let graph = DependencyGraph::from_features(&[
            FeatureConfig::new("x"),
            FeatureConfig::new("y"),
            FeatureConfig::new("z"),
        ]);
        let resolver = DependencyResolver::new();
        let result = resolver.resolve_enable_order(&graph, &ids(&["z", "x", "y"]), true);
        assert_eq!(result.order, ids(&["z", "x", "y"]));
    }

    #[test]
    fn test_disable_cascade_unwinds_dependents_first() {
        let resolver = DependencyResolver::new();
        let result = resolver.resolve_disable_order(&chain_graph(), &ids(&["db"]), true);
        assert!(result.success);
        assert_eq!(result.order, ids(&["app", "api", "db"]));
    }

    #[test]
    fn test_unknown_feature_is_missing_dependency() {
        let resolver = DependencyResolver::new();
        let result = resolver.resolve_enable_order(&chain_graph(), &ids(&["ghost"]), true);
        assert!(!result.success);
        assert_eq!(
            result.missing_dependencies,
            vec![MissingDependency {
                required_by: None,
                dependency: id("ghost"),
            }]
        );
        assert!(matches!(
            result.into_error(),
            Some(LifecycleError::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_unregistered_hard_dependency_is_reported() {
        let graph = DependencyGraph::from_features(&[FeatureConfig::new("a")
            .requires("missing")
            .with_dependency(DependencyEdge::requires("also-missing").optional())]);
        let resolver = DependencyResolver::new();
        let result = resolver.resolve_enable_order(&graph, &ids(&["a"]), true);
        assert!(!result.success);
        assert_eq!(result.missing_dependencies.len(), 1);
        assert_eq!(result.missing_dependencies[0].dependency, id("missing"));
        assert!(result.warnings.iter().any(|w| w.contains("also-missing")));
    }

    #[test]
    fn test_cycle_touching_request_fails() {
        let graph = DependencyGraph::from_features(&[
            FeatureConfig::new("a").requires("b"),
            FeatureConfig::new("b").requires("a"),
            FeatureConfig::new("c"),
        ]);
        let resolver = DependencyResolver::new();

        let result = resolver.resolve_enable_order(&graph, &ids(&["a"]), true);
        assert!(!result.success);
        assert_eq!(result.circular_dependencies, vec![ids(&["a", "b"])]);

        // A cycle elsewhere is only a warning
        let result = resolver.resolve_enable_order(&graph, &ids(&["c"]), true);
        assert!(result.success);
        assert_eq!(result.order, ids(&["c"]));
        assert!(result.warnings.iter().any(|w| w.contains("a -> b -> a")));
    }

    #[test]
    fn test_conflicts_are_warnings_reported_once() {
        let graph = DependencyGraph::from_features(&[
            FeatureConfig::new("a").conflicts_with("b"),
            FeatureConfig::new("b").conflicts_with("a"),
        ]);
        let resolver = DependencyResolver::new();
        let result = resolver.resolve_enable_order(&graph, &ids(&["a", "b"]), true);
        assert!(result.success);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.order.len(), 2);
    }

    #[test]
    fn test_conflict_reached_through_dependency() {
        // a -> b, and b conflicts with c
        let graph = DependencyGraph::from_features(&[
            FeatureConfig::new("a").requires("b"),
            FeatureConfig::new("b").conflicts_with("c"),
            FeatureConfig::new("c"),
        ]);
        let resolver = DependencyResolver::new();

        let result = resolver.resolve_enable_order(&graph, &ids(&["a", "c"]), true);
        assert!(result.success);
        assert_eq!(result.conflicts, vec![FeatureConflict::new(&id("b"), &id("c"))]);
        assert_eq!(result.warnings, vec!["b conflicts with c".to_string()]);
        let position = |name: &str| result.order.iter().position(|f| f == &id(name));
        assert!(position("b") < position("a"));

        // c outside the closure is not reported
        let result = resolver.resolve_enable_order(&graph, &ids(&["a"]), true);
        assert!(result.conflicts.is_empty());

        // With c already enabled, enabling the chain leaves b in conflict
        let mut states = HashMap::new();
        states.insert(id("a"), FeatureStatus::Enabled);
        states.insert(id("b"), FeatureStatus::Enabled);
        states.insert(id("c"), FeatureStatus::Enabled);
        let validation = resolver.validate_feature_state(&graph, &id("b"), &states);
        assert!(!validation.valid);
        assert_eq!(
            validation.warnings,
            vec!["conflicting feature c is enabled while b is enabled".to_string()]
        );
    }

    #[test]
    fn test_validate_feature_state_flags_enabled_dependent() {
        let graph = chain_graph();
        let resolver = DependencyResolver::new();
        let mut states = HashMap::new();
        states.insert(id("api"), FeatureStatus::Enabled);
        states.insert(id("db"), FeatureStatus::Disabled);

        let validation = resolver.validate_feature_state(&graph, &id("db"), &states);
        assert!(!validation.valid);
        assert_eq!(
            validation.warnings,
            vec!["dependent api is enabled while db is disabled".to_string()]
        );

        let validation = resolver.validate_feature_state(&graph, &id("api"), &states);
        assert!(validation.warnings[0].contains("required dependency db"));
    }

    #[test]
    fn test_impact_score_weights() {
        let graph = DependencyGraph::from_features(&[
            FeatureConfig::new("db"),
            FeatureConfig::new("api").requires("db").conflicts_with("legacy"),
            FeatureConfig::new("app").requires("api"),
            FeatureConfig::new("legacy"),
        ]);
        let resolver = DependencyResolver::new();
        let impact = resolver.get_feature_impact(&graph, &id("api"), &HashMap::new());
        assert_eq!(impact.dependencies.len(), 1);
        assert_eq!(impact.dependents.len(), 1);
        assert_eq!(impact.conflicts.len(), 1);
        assert_eq!(impact.impact_score, 1 + 2 + 3);
    }

    #[test]
    fn test_cache_invalidated_by_graph_change() {
        let resolver = DependencyResolver::with_cache(Duration::from_secs(60));
        let mut graph = chain_graph();
        let first = resolver.resolve_enable_order(&graph, &ids(&["app"]), true);
        let again = resolver.resolve_enable_order(&graph, &ids(&["app"]), true);
        assert_eq!(first, again);
        assert_eq!(resolver.cache().map(|c| c.stats().hits), Some(1));

        graph.add_feature(id("app"), vec![]);
        let changed = resolver.resolve_enable_order(&graph, &ids(&["app"]), true);
        assert_eq!(changed.order, ids(&["app"]));
    }
}
