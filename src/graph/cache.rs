//! TTL cache for resolution results.
//!
//! Entries are keyed on the graph content hash, so a rebuilt graph never serves a
//! stale order; the TTL only bounds memory for graphs that stay unchanged.

use super::resolver::ResolutionResult;
use crate::models::FeatureId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveOperation {
    Enable,
    Disable,
}

/// Ids are kept in caller order: ties in the topological sort follow it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: ResolveOperation,
    pub ids: Vec<FeatureId>,
    pub flag: bool,
    pub graph_hash: u64,
}

#[derive(Debug, Clone)]
struct CachedResolution {
    result: ResolutionResult,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug)]
pub struct ResolutionCache {
    ttl: Duration,
    entries: DashMap<CacheKey, CachedResolution>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolutionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<ResolutionResult> {
        let fresh = self
            .entries
            .get(key)
            .filter(|entry| entry.inserted_at.elapsed() < self.ttl)
            .map(|entry| entry.result.clone());

        match fresh {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: CacheKey, result: ResolutionResult) {
        self.entries.insert(
            key,
            CachedResolution {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries, returning how many were evicted
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(hash: u64) -> CacheKey {
        CacheKey {
            operation: ResolveOperation::Enable,
            ids: vec![FeatureId::from("a")],
            flag: true,
            graph_hash: hash,
        }
    }

    #[test]
    fn test_hit_and_miss_accounting() {
        let cache = ResolutionCache::new(Duration::from_secs(60));
        assert!(cache.get(&key(1)).is_none());
        cache.insert(key(1), ResolutionResult::default());
        assert!(cache.get(&key(1)).is_some());
        // Different graph content never matches
        assert!(cache.get(&key(2)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_sweep_evicts_expired_entries() {
        let cache = ResolutionCache::new(Duration::ZERO);
        cache.insert(key(1), ResolutionResult::default());
        assert!(cache.get(&key(1)).is_none());
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.stats().entries, 0);
    }
}
