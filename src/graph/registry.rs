//! Atomically swapped dependency graph.
//!
//! Readers take an `Arc` snapshot and never hold a lock across resolution. Rebuilds
//! construct a complete new graph and swap it in; a tokio mutex serialises rebuilds
//! so a slower load can never overwrite a newer one.

use super::dependency_graph::DependencyGraph;
use crate::collaborators::FeatureStore;
use crate::error::{LifecycleError, LifecycleResult};
use crate::models::FeatureConfig;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug)]
pub struct FeatureGraphRegistry {
    graph: RwLock<Arc<DependencyGraph>>,
    rebuild_lock: Mutex<()>,
    generation: AtomicU64,
}

impl Default for FeatureGraphRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureGraphRegistry {
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(Arc::new(DependencyGraph::new())),
            rebuild_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Current graph; stays valid even if a rebuild swaps in a newer one
    pub fn snapshot(&self) -> Arc<DependencyGraph> {
        Arc::clone(&*self.graph.read())
    }

    /// Number of completed rebuilds
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Build a fresh graph from `configs` and swap it in
    pub async fn rebuild<I>(&self, configs: I) -> Arc<DependencyGraph>
    where
        I: IntoIterator<Item = FeatureConfig>,
    {
        let _guard = self.rebuild_lock.lock().await;
        let configs: Vec<FeatureConfig> = configs.into_iter().collect();
        self.swap(DependencyGraph::from_features(&configs))
    }

    /// Reload every configuration from the store and swap in the resulting graph.
    ///
    /// The load happens under the rebuild lock so concurrent registrations are applied
    /// in order.
    pub async fn rebuild_from_store(
        &self,
        store: &dyn FeatureStore,
    ) -> LifecycleResult<Arc<DependencyGraph>> {
        let _guard = self.rebuild_lock.lock().await;
        let configs = store
            .list_configs()
            .await
            .map_err(|e| LifecycleError::collaborator(&e))?;
        Ok(self.swap(DependencyGraph::from_features(&configs)))
    }

    fn swap(&self, graph: DependencyGraph) -> Arc<DependencyGraph> {
        let graph = Arc::new(graph);
        let previous_hash = {
            let mut current = self.graph.write();
            let previous = current.content_hash();
            *current = Arc::clone(&graph);
            previous
        };
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        if previous_hash == graph.content_hash() {
            debug!(generation, "feature graph rebuilt without changes");
        } else {
            info!(
                generation,
                features = graph.len(),
                has_cycle = graph.has_cycle(),
                "feature graph rebuilt"
            );
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeatureId;

    #[tokio::test]
    async fn test_snapshot_survives_rebuild() {
        let registry = FeatureGraphRegistry::new();
        registry
            .rebuild(vec![FeatureConfig::new("a"), FeatureConfig::new("b").requires("a")])
            .await;
        let before = registry.snapshot();

        registry.rebuild(vec![FeatureConfig::new("c")]).await;
        let after = registry.snapshot();

        assert!(before.contains(&FeatureId::from("b")));
        assert!(!after.contains(&FeatureId::from("b")));
        assert_eq!(registry.generation(), 2);
        assert_ne!(before.content_hash(), after.content_hash());
    }
}
