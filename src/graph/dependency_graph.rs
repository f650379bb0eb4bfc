//! # Dependency Graph
//!
//! In-memory structure of features and their typed dependency edges.
//!
//! Forward edges keep every kind; the reverse index only tracks `Requires` edges, so
//! "dependents" always means features that require the node. Cycle detection only
//! follows `Requires` edges: conflict/enhancement/deprecation loops are not cycles.

use crate::models::{DependencyEdge, DependencyKind, FeatureConfig, FeatureId};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<FeatureId>,
    edges: HashMap<FeatureId, Vec<DependencyEdge>>,
    reverse_edges: HashMap<FeatureId, BTreeSet<FeatureId>>,
    content_hash: u64,
}

impl DependencyGraph {
    pub fn new() -> Self {
        let mut graph = Self::default();
        graph.refresh_hash();
        graph
    }

    /// Build a graph wholesale from a set of feature configurations
    pub fn from_features<'a, I>(features: I) -> Self
    where
        I: IntoIterator<Item = &'a FeatureConfig>,
    {
        let mut graph = Self::new();
        for feature in features {
            graph.insert_edges(feature.feature_id.clone(), feature.dependencies.clone());
        }
        graph.refresh_hash();
        graph
    }

    /// Register a feature, replacing any edges it previously had
    pub fn add_feature(&mut self, id: FeatureId, dependencies: Vec<DependencyEdge>) {
        self.insert_edges(id, dependencies);
        self.refresh_hash();
    }

    /// Remove a feature and its forward edges; reverse references it held are pruned
    pub fn remove_feature(&mut self, id: &FeatureId) -> bool {
        if !self.nodes.remove(id) {
            return false;
        }
        self.drop_forward_edges(id);
        self.refresh_hash();
        true
    }

    fn insert_edges(&mut self, id: FeatureId, dependencies: Vec<DependencyEdge>) {
        self.drop_forward_edges(&id);
        for edge in &dependencies {
            if edge.kind == DependencyKind::Requires {
                self.reverse_edges
                    .entry(edge.target.clone())
                    .or_default()
                    .insert(id.clone());
            }
        }
        self.nodes.insert(id.clone());
        self.edges.insert(id, dependencies);
    }

    fn drop_forward_edges(&mut self, id: &FeatureId) {
        if let Some(previous) = self.edges.remove(id) {
            for edge in previous
                .iter()
                .filter(|edge| edge.kind == DependencyKind::Requires)
            {
                if let Some(dependents) = self.reverse_edges.get_mut(&edge.target) {
                    dependents.remove(id);
                    if dependents.is_empty() {
                        self.reverse_edges.remove(&edge.target);
                    }
                }
            }
        }
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.nodes.contains(id)
    }

    /// Registered features in stable (sorted) order
    pub fn features(&self) -> impl Iterator<Item = &FeatureId> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All outgoing edges of a feature, every kind
    pub fn get_dependencies(&self, id: &FeatureId) -> &[DependencyEdge] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Targets of outgoing `Requires` edges
    pub fn required_targets<'a>(&'a self, id: &FeatureId) -> impl Iterator<Item = &'a FeatureId> {
        self.get_dependencies(id)
            .iter()
            .filter(|edge| edge.kind == DependencyKind::Requires)
            .map(|edge| &edge.target)
    }

    /// Registered features that require `id`
    pub fn get_dependents(&self, id: &FeatureId) -> Vec<FeatureId> {
        self.reverse_edges
            .get(id)
            .map(|dependents| {
                dependents
                    .iter()
                    .filter(|dependent| self.nodes.contains(*dependent))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Features linked to `id` by a `Conflicts` edge in either direction
    pub fn conflict_partners(&self, id: &FeatureId) -> Vec<FeatureId> {
        let mut partners: BTreeSet<FeatureId> = self
            .get_dependencies(id)
            .iter()
            .filter(|edge| edge.kind == DependencyKind::Conflicts)
            .map(|edge| edge.target.clone())
            .collect();
        for (owner, edges) in &self.edges {
            if owner != id
                && edges
                    .iter()
                    .any(|edge| edge.kind == DependencyKind::Conflicts && &edge.target == id)
            {
                partners.insert(owner.clone());
            }
        }
        partners.remove(id);
        partners.into_iter().collect()
    }

    /// Whether any `Requires` cycle exists among registered features
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        self.nodes
            .iter()
            .any(|node| self.cycle_from(node, &mut visited, &mut on_stack))
    }

    fn cycle_from<'a>(
        &'a self,
        node: &'a FeatureId,
        visited: &mut HashSet<&'a FeatureId>,
        on_stack: &mut HashSet<&'a FeatureId>,
    ) -> bool {
        if on_stack.contains(node) {
            return true;
        }
        if !visited.insert(node) {
            return false;
        }
        on_stack.insert(node);
        for target in self.required_targets(node) {
            if self.nodes.contains(target) && self.cycle_from(target, visited, on_stack) {
                return true;
            }
        }
        on_stack.remove(node);
        false
    }

    /// Every distinct `Requires` cycle reachable by DFS, as ordered id sequences.
    ///
    /// Each cycle is rotated so its smallest id comes first. Diagnostic only: cycles
    /// are never broken automatically.
    pub fn find_cycles(&self) -> Vec<Vec<FeatureId>> {
        self.find_cycles_within(|_| true)
    }

    /// Cycles restricted to nodes accepted by `scope`
    pub fn find_cycles_within<F>(&self, scope: F) -> Vec<Vec<FeatureId>>
    where
        F: Fn(&FeatureId) -> bool,
    {
        let mut visited: HashSet<&FeatureId> = HashSet::new();
        let mut stack: Vec<&FeatureId> = Vec::new();
        let mut seen: HashSet<Vec<FeatureId>> = HashSet::new();
        let mut cycles = Vec::new();

        for node in self.nodes.iter().filter(|node| scope(node)) {
            if !visited.contains(node) {
                self.collect_cycles(node, &scope, &mut visited, &mut stack, &mut seen, &mut cycles);
            }
        }
        cycles
    }

    fn collect_cycles<'a, F>(
        &'a self,
        node: &'a FeatureId,
        scope: &F,
        visited: &mut HashSet<&'a FeatureId>,
        stack: &mut Vec<&'a FeatureId>,
        seen: &mut HashSet<Vec<FeatureId>>,
        cycles: &mut Vec<Vec<FeatureId>>,
    ) where
        F: Fn(&FeatureId) -> bool,
    {
        visited.insert(node);
        stack.push(node);

        for target in self.required_targets(node) {
            if !self.nodes.contains(target) || !scope(target) {
                continue;
            }
            if let Some(position) = stack.iter().position(|entry| *entry == target) {
                let cycle = normalize_cycle(&stack[position..]);
                if seen.insert(cycle.clone()) {
                    cycles.push(cycle);
                }
            } else if !visited.contains(target) {
                self.collect_cycles(target, scope, visited, stack, seen, cycles);
            }
        }

        stack.pop();
    }

    /// Hash of the graph content; changes whenever nodes or edges change
    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }

    fn refresh_hash(&mut self) {
        let mut hasher = DefaultHasher::new();
        for node in &self.nodes {
            node.hash(&mut hasher);
            if let Some(edges) = self.edges.get(node) {
                edges.hash(&mut hasher);
            }
        }
        self.content_hash = hasher.finish();
    }
}

fn normalize_cycle(path: &[&FeatureId]) -> Vec<FeatureId> {
    let start = path
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    path[start..]
        .iter()
        .chain(path[..start].iter())
        .map(|id| (*id).clone())
        .collect()
}
