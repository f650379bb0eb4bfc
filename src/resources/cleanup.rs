//! # Cleanup Manager
//!
//! Releases everything tracked for a feature in five fixed stages: memory, files,
//! temp data, cache, registries. Every stage runs regardless of how the previous ones
//! went; problems are recorded in the report instead of aborting. A leaked resource is
//! preferable to a shutdown that never finishes.

use super::tracker::{FeatureResources, ResourceSnapshot, ResourceTracker};
use crate::collaborators::{CacheInvalidator, HostMetrics, HostProbe};
use crate::models::{FeatureId, ResourceBindings};
use crate::utils::time::retention_cutoff;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStage {
    Memory,
    Files,
    TempData,
    Cache,
    Registries,
}

impl CleanupStage {
    pub const ALL: [CleanupStage; 5] = [
        Self::Memory,
        Self::Files,
        Self::TempData,
        Self::Cache,
        Self::Registries,
    ];
}

impl fmt::Display for CleanupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Files => write!(f, "files"),
            Self::TempData => write!(f, "temp_data"),
            Self::Cache => write!(f, "cache"),
            Self::Registries => write!(f, "registries"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: CleanupStage,
    pub success: bool,
    pub items_cleaned: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl StageReport {
    fn new(stage: CleanupStage) -> Self {
        Self {
            stage,
            success: true,
            items_cleaned: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub feature_id: FeatureId,
    pub stages: Vec<StageReport>,
    pub before: Option<HostMetrics>,
    pub after: Option<HostMetrics>,
    /// Host memory delta when both samples exist, else the tracked estimate
    pub memory_freed_bytes: u64,
    pub total_items_cleaned: usize,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl CleanupReport {
    pub fn stage(&self, stage: CleanupStage) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }

    pub fn errors(&self) -> Vec<String> {
        self.stages
            .iter()
            .flat_map(|report| {
                report
                    .errors
                    .iter()
                    .map(move |error| format!("{}: {error}", report.stage))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceCleanupReport {
    pub feature_id: FeatureId,
    pub released_items: usize,
    pub temp_dir_removed: bool,
    pub errors: Vec<String>,
}

pub struct CleanupManager {
    tracker: Arc<ResourceTracker>,
    cache: Option<Arc<dyn CacheInvalidator>>,
    probe: Option<Arc<dyn HostProbe>>,
    temp_root: PathBuf,
    history: Mutex<VecDeque<ResourceSnapshot>>,
    history_limit: usize,
}

impl fmt::Debug for CleanupManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupManager")
            .field("temp_root", &self.temp_root)
            .field("has_cache", &self.cache.is_some())
            .field("has_probe", &self.probe.is_some())
            .finish()
    }
}

impl CleanupManager {
    pub fn new(tracker: Arc<ResourceTracker>, temp_root: impl Into<PathBuf>, history_limit: usize) -> Self {
        Self {
            tracker,
            cache: None,
            probe: None,
            temp_root: temp_root.into(),
            history: Mutex::new(VecDeque::new()),
            history_limit,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HostProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn tracker(&self) -> &Arc<ResourceTracker> {
        &self.tracker
    }

    /// Scoped temp directory owned by a feature.
    ///
    /// Bytes outside `[A-Za-z0-9-]` are written as `_XX` hex escapes, `_` included, so
    /// distinct ids never share a directory.
    pub fn feature_temp_dir(&self, feature_id: &FeatureId) -> PathBuf {
        let mut encoded = String::with_capacity(feature_id.as_str().len());
        for byte in feature_id.as_str().bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                encoded.push(char::from(byte));
            } else {
                encoded.push_str(&format!("_{byte:02X}"));
            }
        }
        self.temp_root.join(encoded)
    }

    /// Snapshot what the feature holds and keep it in the bounded history
    pub fn capture_snapshot(&self, feature_id: &FeatureId, bindings: &ResourceBindings) -> ResourceSnapshot {
        let snapshot = self.tracker.snapshot(feature_id, bindings);
        let mut history = self.history.lock();
        history.push_back(snapshot.clone());
        while history.len() > self.history_limit {
            history.pop_front();
        }
        snapshot
    }

    pub fn snapshot_history(&self, feature_id: Option<&FeatureId>) -> Vec<ResourceSnapshot> {
        self.history
            .lock()
            .iter()
            .filter(|snapshot| feature_id.map_or(true, |id| &snapshot.feature_id == id))
            .cloned()
            .collect()
    }

    pub fn prune_history(&self, older_than: Duration) -> usize {
        let cutoff = retention_cutoff(older_than);
        let mut history = self.history.lock();
        let before = history.len();
        history.retain(|snapshot| snapshot.timestamp >= cutoff);
        before - history.len()
    }

    /// Run all five stages for a feature
    #[instrument(skip(self), fields(feature_id = %feature_id))]
    pub async fn cleanup(&self, feature_id: &FeatureId) -> CleanupReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let before = self.sample().await;
        let resources = self.tracker.take(feature_id).unwrap_or_default();
        let estimated_bytes = resources.estimated_memory_bytes();

        let FeatureResources {
            memory,
            weak,
            files,
            temp_dirs,
            cache_keys,
            tasks,
            permits,
            handles,
        } = resources;

        let mut stages = Vec::with_capacity(CleanupStage::ALL.len());

        // Memory
        let mut report = StageReport::new(CleanupStage::Memory);
        let stage_started = Instant::now();
        report.items_cleaned = memory.len() + weak.len();
        drop(memory);
        drop(weak);
        if let Some(probe) = &self.probe {
            if let Err(e) = probe.request_collection().await {
                report.warnings.push(format!("collection request failed: {e:#}"));
            }
        }
        stages.push(finish_stage(report, stage_started));

        // Files
        let mut report = StageReport::new(CleanupStage::Files);
        let stage_started = Instant::now();
        for path in &files {
            match tokio::fs::remove_file(path).await {
                Ok(()) => report.items_cleaned += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    report.warnings.push(format!("{} already gone", path.display()))
                }
                Err(e) => report.errors.push(format!("{}: {e}", path.display())),
            }
        }
        stages.push(finish_stage(report, stage_started));

        // Temp data: tracked directories plus the feature's scoped directory
        let mut report = StageReport::new(CleanupStage::TempData);
        let stage_started = Instant::now();
        for dir in &temp_dirs {
            match remove_dir(dir).await {
                Ok(true) => report.items_cleaned += 1,
                Ok(false) => report.warnings.push(format!("{} already gone", dir.display())),
                Err(e) => report.errors.push(format!("{}: {e}", dir.display())),
            }
        }
        let scoped = self.feature_temp_dir(feature_id);
        if !temp_dirs.contains(&scoped) {
            match remove_dir(&scoped).await {
                Ok(true) => report.items_cleaned += 1,
                Ok(false) => {}
                Err(e) => report.errors.push(format!("{}: {e}", scoped.display())),
            }
        }
        stages.push(finish_stage(report, stage_started));

        // Cache
        let mut report = StageReport::new(CleanupStage::Cache);
        let stage_started = Instant::now();
        match &self.cache {
            Some(cache) => {
                for key in &cache_keys {
                    match cache.invalidate(key).await {
                        Ok(true) => report.items_cleaned += 1,
                        Ok(false) => report.warnings.push(format!("cache key {key} not present")),
                        Err(e) => report.errors.push(format!("cache key {key}: {e:#}")),
                    }
                }
            }
            None if !cache_keys.is_empty() => report.warnings.push(format!(
                "{} cache keys tracked but no cache invalidator configured",
                cache_keys.len()
            )),
            None => {}
        }
        stages.push(finish_stage(report, stage_started));

        // Registries
        let mut report = StageReport::new(CleanupStage::Registries);
        let stage_started = Instant::now();
        for (id, task) in &tasks {
            if task.is_finished() {
                report.warnings.push(format!("task {id} had already finished"));
            } else {
                task.abort();
            }
        }
        report.items_cleaned = tasks.len() + permits.len() + handles.len();
        drop(permits);
        stages.push(finish_stage(report, stage_started));

        let after = self.sample().await;
        let memory_freed_bytes = match (before, after) {
            (Some(before), Some(after)) => before.memory_bytes.saturating_sub(after.memory_bytes),
            _ => estimated_bytes,
        };
        let total_items_cleaned = stages.iter().map(|s| s.items_cleaned).sum();
        let success = stages.iter().all(|s| s.success);

        let report = CleanupReport {
            feature_id: feature_id.clone(),
            stages,
            before,
            after,
            memory_freed_bytes,
            total_items_cleaned,
            success,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        if report.success {
            info!(
                items = report.total_items_cleaned,
                memory_freed_bytes = report.memory_freed_bytes,
                "Cleanup completed"
            );
        } else {
            warn!(errors = ?report.errors(), "Cleanup completed with errors");
        }
        report
    }

    /// Emergency path: drop all tracking, delete the temp directory and request a
    /// collection pass, without staging or reporting per-stage detail
    #[instrument(skip(self), fields(feature_id = %feature_id))]
    pub async fn force_cleanup(&self, feature_id: &FeatureId) -> ForceCleanupReport {
        let mut errors = Vec::new();
        let released_items = match self.tracker.take(feature_id) {
            Some(resources) => {
                for task in resources.tasks.values() {
                    task.abort();
                }
                resources.total()
            }
            None => 0,
        };

        let temp_dir = self.feature_temp_dir(feature_id);
        let temp_dir_removed = match remove_dir(&temp_dir).await {
            Ok(removed) => removed,
            Err(e) => {
                errors.push(format!("{}: {e}", temp_dir.display()));
                false
            }
        };

        if let Some(probe) = &self.probe {
            if let Err(e) = probe.request_collection().await {
                errors.push(format!("collection request failed: {e:#}"));
            }
        }

        warn!(released_items, temp_dir_removed, "Forced cleanup");
        ForceCleanupReport {
            feature_id: feature_id.clone(),
            released_items,
            temp_dir_removed,
            errors,
        }
    }

    async fn sample(&self) -> Option<HostMetrics> {
        let probe = self.probe.as_ref()?;
        match probe.sample().await {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                debug!(error = %e, "Host probe sample failed");
                None
            }
        }
    }
}

fn finish_stage(mut report: StageReport, started: Instant) -> StageReport {
    report.success = report.errors.is_empty();
    report.duration_ms = started.elapsed().as_millis() as u64;
    report
}

/// Remove a directory tree; `Ok(false)` when it did not exist
async fn remove_dir(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
