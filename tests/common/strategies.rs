//! Proptest strategies for dependency graphs

use feature_lifecycle::graph::DependencyGraph;
use feature_lifecycle::models::{DependencyEdge, FeatureId};
use proptest::prelude::*;

pub fn feature_name(index: usize) -> FeatureId {
    FeatureId::new(format!("f{index:02}"))
}

/// Acyclic graph: feature `i` may only require features with a smaller index
pub fn dag_strategy() -> impl Strategy<Value = DependencyGraph> {
    (1usize..12)
        .prop_flat_map(|size| {
            let edges = (0..size)
                .map(|i| proptest::collection::vec(any::<bool>(), i))
                .collect::<Vec<_>>();
            (Just(size), edges)
        })
        .prop_map(|(_, edges)| {
            let mut graph = DependencyGraph::new();
            for (i, row) in edges.iter().enumerate() {
                let deps = row
                    .iter()
                    .enumerate()
                    .filter(|(_, present)| **present)
                    .map(|(j, _)| DependencyEdge::requires(feature_name(j)))
                    .collect();
                graph.add_feature(feature_name(i), deps);
            }
            graph
        })
}

/// Arbitrary `Requires` edges between a handful of features, cycles allowed
pub fn any_graph_strategy() -> impl Strategy<Value = DependencyGraph> {
    (1usize..8)
        .prop_flat_map(|size| {
            (
                Just(size),
                proptest::collection::vec((0..size, 0..size), 0..(size * 2)),
            )
        })
        .prop_map(|(size, edges)| {
            let mut graph = DependencyGraph::new();
            for i in 0..size {
                let deps = edges
                    .iter()
                    .filter(|(from, to)| *from == i && from != to)
                    .map(|(_, to)| DependencyEdge::requires(feature_name(*to)))
                    .collect();
                graph.add_feature(feature_name(i), deps);
            }
            graph
        })
}
