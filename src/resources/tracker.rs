//! # Resource Tracker
//!
//! Per-feature registry of everything a feature holds that must be released when it
//! is turned off. Strong handles, file paths, cache keys, task abort handles and
//! semaphore permits are owned here; weak references are only observed and drop out
//! on their own once the referent is gone.

use crate::models::{FeatureId, ResourceBindings, ResourceKind};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

pub type SharedObject = Arc<dyn Any + Send + Sync>;

pub(crate) struct TrackedMemory {
    #[allow(dead_code)]
    pub(crate) handle: SharedObject,
    pub(crate) estimated_bytes: u64,
}

/// Everything tracked for one feature
#[derive(Default)]
pub struct FeatureResources {
    pub(crate) memory: HashMap<String, TrackedMemory>,
    pub(crate) weak: HashMap<String, Weak<dyn Any + Send + Sync>>,
    pub(crate) files: BTreeSet<PathBuf>,
    pub(crate) temp_dirs: BTreeSet<PathBuf>,
    pub(crate) cache_keys: BTreeSet<String>,
    pub(crate) tasks: HashMap<String, AbortHandle>,
    pub(crate) permits: HashMap<String, OwnedSemaphorePermit>,
    pub(crate) handles: BTreeSet<String>,
}

impl FeatureResources {
    fn live_weak_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .weak
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn ids_by_kind(&self) -> BTreeMap<ResourceKind, Vec<String>> {
        let sorted_keys = |keys: Vec<&String>| {
            let mut ids: Vec<String> = keys.into_iter().cloned().collect();
            ids.sort();
            ids
        };
        let paths = |set: &BTreeSet<PathBuf>| {
            set.iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
        };

        let mut by_kind = BTreeMap::new();
        let entries = [
            (ResourceKind::MemoryObject, sorted_keys(self.memory.keys().collect())),
            (ResourceKind::WeakReference, self.live_weak_ids()),
            (ResourceKind::File, paths(&self.files)),
            (ResourceKind::TempDirectory, paths(&self.temp_dirs)),
            (ResourceKind::CacheKey, self.cache_keys.iter().cloned().collect()),
            (ResourceKind::Thread, sorted_keys(self.tasks.keys().collect())),
            (ResourceKind::Semaphore, sorted_keys(self.permits.keys().collect())),
            (ResourceKind::Handle, self.handles.iter().cloned().collect()),
        ];
        for (kind, ids) in entries {
            if !ids.is_empty() {
                by_kind.insert(kind, ids);
            }
        }
        by_kind
    }

    pub fn estimated_memory_bytes(&self) -> u64 {
        self.memory.values().map(|m| m.estimated_bytes).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
            && self.weak.is_empty()
            && self.files.is_empty()
            && self.temp_dirs.is_empty()
            && self.cache_keys.is_empty()
            && self.tasks.is_empty()
            && self.permits.is_empty()
            && self.handles.is_empty()
    }

    pub fn total(&self) -> usize {
        self.memory.len()
            + self.weak.len()
            + self.files.len()
            + self.temp_dirs.len()
            + self.cache_keys.len()
            + self.tasks.len()
            + self.permits.len()
            + self.handles.len()
    }
}

/// Pre-operation record of what a feature held, used for rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub id: Uuid,
    pub feature_id: FeatureId,
    pub timestamp: DateTime<Utc>,
    pub resources_by_kind: BTreeMap<ResourceKind, Vec<String>>,
}

impl ResourceSnapshot {
    pub fn ids(&self, kind: ResourceKind) -> &[String] {
        self.resources_by_kind
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the snapshot captured anything of this kind
    pub fn has_kind(&self, kind: ResourceKind) -> bool {
        !self.ids(kind).is_empty()
    }

    pub fn total(&self) -> usize {
        self.resources_by_kind.values().map(Vec::len).sum()
    }
}

#[derive(Default)]
pub struct ResourceTracker {
    features: DashMap<FeatureId, FeatureResources>,
}

impl std::fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("features", &self.features.len())
            .finish()
    }
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_memory(
        &self,
        feature_id: &FeatureId,
        id: impl Into<String>,
        handle: SharedObject,
        estimated_bytes: u64,
    ) {
        self.features.entry(feature_id.clone()).or_default().memory.insert(
            id.into(),
            TrackedMemory {
                handle,
                estimated_bytes,
            },
        );
    }

    /// Observe an object without keeping it alive
    pub fn track_weak<T>(&self, feature_id: &FeatureId, id: impl Into<String>, value: &Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(value) as Weak<dyn Any + Send + Sync>;
        self.features
            .entry(feature_id.clone())
            .or_default()
            .weak
            .insert(id.into(), weak);
    }

    pub fn track_file(&self, feature_id: &FeatureId, path: impl Into<PathBuf>) {
        self.features
            .entry(feature_id.clone())
            .or_default()
            .files
            .insert(path.into());
    }

    pub fn track_temp_dir(&self, feature_id: &FeatureId, path: impl Into<PathBuf>) {
        self.features
            .entry(feature_id.clone())
            .or_default()
            .temp_dirs
            .insert(path.into());
    }

    pub fn track_cache_key(&self, feature_id: &FeatureId, key: impl Into<String>) {
        self.features
            .entry(feature_id.clone())
            .or_default()
            .cache_keys
            .insert(key.into());
    }

    /// Track a spawned worker; it is aborted during cleanup
    pub fn track_task(&self, feature_id: &FeatureId, id: impl Into<String>, handle: AbortHandle) {
        self.features
            .entry(feature_id.clone())
            .or_default()
            .tasks
            .insert(id.into(), handle);
    }

    /// Hold a semaphore permit until the feature is cleaned up
    pub fn track_permit(
        &self,
        feature_id: &FeatureId,
        id: impl Into<String>,
        permit: OwnedSemaphorePermit,
    ) {
        self.features
            .entry(feature_id.clone())
            .or_default()
            .permits
            .insert(id.into(), permit);
    }

    pub fn track_handle(&self, feature_id: &FeatureId, id: impl Into<String>) {
        self.features
            .entry(feature_id.clone())
            .or_default()
            .handles
            .insert(id.into());
    }

    /// Drop weak references whose referent is gone; returns how many were removed
    pub fn prune_dead_references(&self) -> usize {
        let mut removed = 0;
        for mut entry in self.features.iter_mut() {
            let before = entry.weak.len();
            entry.weak.retain(|_, weak| weak.strong_count() > 0);
            removed += before - entry.weak.len();
        }
        self.features.retain(|_, resources| !resources.is_empty());
        if removed > 0 {
            debug!(removed, "Pruned dead weak references");
        }
        removed
    }

    /// Capture bindings plus tracked resources for a feature
    pub fn snapshot(&self, feature_id: &FeatureId, bindings: &ResourceBindings) -> ResourceSnapshot {
        let mut resources_by_kind = self
            .features
            .get(feature_id)
            .map(|resources| resources.ids_by_kind())
            .unwrap_or_default();

        for kind in ResourceKind::STOPPABLE {
            let ids = bindings.ids_for(kind);
            if !ids.is_empty() {
                resources_by_kind.insert(kind, ids.to_vec());
            }
        }

        ResourceSnapshot {
            id: Uuid::new_v4(),
            feature_id: feature_id.clone(),
            timestamp: Utc::now(),
            resources_by_kind,
        }
    }

    pub fn counts(&self, feature_id: &FeatureId) -> BTreeMap<ResourceKind, usize> {
        self.features
            .get(feature_id)
            .map(|resources| {
                resources
                    .ids_by_kind()
                    .into_iter()
                    .map(|(kind, ids)| (kind, ids.len()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_tracked(&self, feature_id: &FeatureId) -> bool {
        self.features.contains_key(feature_id)
    }

    pub fn tracked_features(&self) -> Vec<FeatureId> {
        let mut ids: Vec<FeatureId> = self.features.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Remove and return everything tracked for the feature
    pub fn take(&self, feature_id: &FeatureId) -> Option<FeatureResources> {
        self.features.remove(feature_id).map(|(_, resources)| resources)
    }

    /// Stop tracking a feature, dropping owned handles and permits.
    ///
    /// Returns how many entries were released.
    pub fn release(&self, feature_id: &FeatureId) -> usize {
        self.take(feature_id)
            .map(|resources| resources.total())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Semaphore;

    fn feature() -> FeatureId {
        FeatureId::from("momentum")
    }

    #[test]
    fn test_weak_references_are_not_owned() {
        let tracker = ResourceTracker::new();
        let value = Arc::new(42u64);
        tracker.track_weak(&feature(), "model", &value);
        assert_eq!(tracker.counts(&feature()).get(&ResourceKind::WeakReference), Some(&1));

        drop(value);
        assert_eq!(tracker.prune_dead_references(), 1);
        assert!(!tracker.is_tracked(&feature()));
    }

    #[test]
    fn test_snapshot_merges_bindings_and_tracked() {
        let tracker = ResourceTracker::new();
        tracker.track_file(&feature(), "/tmp/momentum/state.json");
        tracker.track_cache_key(&feature(), "momentum:signals");
        let bindings = ResourceBindings::new().with_agents(["agent-1"]);

        let snapshot = tracker.snapshot(&feature(), &bindings);
        assert_eq!(snapshot.ids(ResourceKind::Agent), &["agent-1".to_string()]);
        assert!(snapshot.has_kind(ResourceKind::File));
        assert!(snapshot.has_kind(ResourceKind::CacheKey));
        assert!(!snapshot.has_kind(ResourceKind::Service));
        assert_eq!(snapshot.total(), 3);
    }

    #[tokio::test]
    async fn test_release_drops_permits() {
        let tracker = ResourceTracker::new();
        let semaphore = Arc::new(Semaphore::new(1));
        let permit = Arc::clone(&semaphore).acquire_owned().await.unwrap();
        tracker.track_permit(&feature(), "slot", permit);
        tracker.track_memory(&feature(), "buffer", Arc::new(vec![0u8; 16]), 16);
        assert_eq!(semaphore.available_permits(), 0);

        assert_eq!(tracker.release(&feature()), 2);
        assert_eq!(semaphore.available_permits(), 1);
        assert_eq!(tracker.release(&feature()), 0);
    }
}
