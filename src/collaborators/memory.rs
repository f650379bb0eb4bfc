//! In-process collaborator implementations.
//!
//! Used by the test suite and by hosts embedding the engine without external
//! persistence. Failure injection hooks make error paths reachable.

use super::{
    CacheInvalidator, FeatureStore, HostMetrics, HostProbe, ResourceStopper, SystemEvent,
    SystemEventBus,
};
use crate::models::{AuditEntry, FeatureConfig, FeatureId, FeatureState};
use anyhow::bail;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct InMemoryFeatureStore {
    configs: RwLock<HashMap<FeatureId, FeatureConfig>>,
    states: RwLock<HashMap<FeatureId, FeatureState>>,
    audit: Mutex<Vec<AuditEntry>>,
    fail_state_writes: AtomicBool,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configs<I>(configs: I) -> Self
    where
        I: IntoIterator<Item = FeatureConfig>,
    {
        let store = Self::new();
        {
            let mut map = store.configs.write();
            for config in configs {
                map.insert(config.feature_id.clone(), config);
            }
        }
        store
    }

    /// Make every subsequent `put_state` fail
    pub fn fail_state_writes(&self, fail: bool) {
        self.fail_state_writes.store(fail, Ordering::SeqCst);
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().clone()
    }
}

#[async_trait]
impl FeatureStore for InMemoryFeatureStore {
    async fn get_config(&self, feature_id: &FeatureId) -> anyhow::Result<Option<FeatureConfig>> {
        Ok(self.configs.read().get(feature_id).cloned())
    }

    async fn put_config(&self, config: &FeatureConfig) -> anyhow::Result<()> {
        self.configs
            .write()
            .insert(config.feature_id.clone(), config.clone());
        Ok(())
    }

    async fn remove_config(&self, feature_id: &FeatureId) -> anyhow::Result<bool> {
        Ok(self.configs.write().remove(feature_id).is_some())
    }

    async fn list_configs(&self) -> anyhow::Result<Vec<FeatureConfig>> {
        let mut configs: Vec<FeatureConfig> = self.configs.read().values().cloned().collect();
        configs.sort_by(|a, b| a.feature_id.cmp(&b.feature_id));
        Ok(configs)
    }

    async fn get_state(&self, feature_id: &FeatureId) -> anyhow::Result<Option<FeatureState>> {
        Ok(self.states.read().get(feature_id).cloned())
    }

    async fn put_state(&self, state: &FeatureState) -> anyhow::Result<()> {
        if self.fail_state_writes.load(Ordering::SeqCst) {
            bail!("database write rejected for {}", state.feature_id);
        }
        self.states
            .write()
            .insert(state.feature_id.clone(), state.clone());
        Ok(())
    }

    async fn list_states(&self) -> anyhow::Result<Vec<FeatureState>> {
        Ok(self.states.read().values().cloned().collect())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        self.audit.lock().push(entry.clone());
        Ok(())
    }
}

/// Stopper over an in-memory set of running resource ids.
///
/// Ids in the refuse list are never reported as stopped; `fail_next` queues errors
/// returned by upcoming `stop` calls.
#[derive(Debug, Default)]
pub struct MemoryStopper {
    running: Mutex<BTreeSet<String>>,
    refuse: Mutex<HashSet<String>>,
    queued_failures: Mutex<VecDeque<String>>,
    fail_restart: AtomicBool,
    delay: Mutex<Option<Duration>>,
    stop_calls: Mutex<Vec<Vec<String>>>,
    restart_calls: Mutex<Vec<Vec<String>>>,
}

impl MemoryStopper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_running<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stopper = Self::new();
        stopper
            .running
            .lock()
            .extend(ids.into_iter().map(Into::into));
        stopper
    }

    pub fn refuse(&self, id: impl Into<String>) {
        self.refuse.lock().insert(id.into());
    }

    pub fn allow(&self, id: &str) {
        self.refuse.lock().remove(id);
    }

    /// Queue an error for the next `stop` call
    pub fn fail_next(&self, message: impl Into<String>) {
        self.queued_failures.lock().push_back(message.into());
    }

    pub fn fail_restarts(&self, fail: bool) {
        self.fail_restart.store(fail, Ordering::SeqCst);
    }

    /// Make each `stop` call take this long
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running.lock().contains(id)
    }

    pub fn stop_calls(&self) -> Vec<Vec<String>> {
        self.stop_calls.lock().clone()
    }

    pub fn restart_calls(&self) -> Vec<Vec<String>> {
        self.restart_calls.lock().clone()
    }
}

#[async_trait]
impl ResourceStopper for MemoryStopper {
    async fn stop(&self, _feature_id: &FeatureId, resource_ids: &[String]) -> anyhow::Result<Vec<String>> {
        self.stop_calls.lock().push(resource_ids.to_vec());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.queued_failures.lock().pop_front();
        if let Some(message) = queued {
            bail!(message);
        }

        let refuse = self.refuse.lock().clone();
        let mut running = self.running.lock();
        Ok(resource_ids
            .iter()
            .filter(|id| !refuse.contains(*id))
            .inspect(|id| {
                running.remove(*id);
            })
            .cloned()
            .collect())
    }

    async fn restart(&self, resource_ids: &[String]) -> anyhow::Result<()> {
        self.restart_calls.lock().push(resource_ids.to_vec());
        if self.fail_restart.load(Ordering::SeqCst) {
            bail!("service refused to restart {}", resource_ids.join(","));
        }
        self.running
            .lock()
            .extend(resource_ids.iter().cloned());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    keys: Mutex<HashSet<String>>,
    invalidated: Mutex<Vec<String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>) {
        self.keys.lock().insert(key.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().contains(key)
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().clone()
    }
}

#[async_trait]
impl CacheInvalidator for MemoryCache {
    async fn invalidate(&self, key: &str) -> anyhow::Result<bool> {
        self.invalidated.lock().push(key.to_string());
        Ok(self.keys.lock().remove(key))
    }
}

/// Probe returning queued samples, then repeating the last one
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    samples: Mutex<VecDeque<HostMetrics>>,
    last: Mutex<HostMetrics>,
    collections: Mutex<u64>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_sample(&self, metrics: HostMetrics) {
        self.samples.lock().push_back(metrics);
    }

    pub fn collection_requests(&self) -> u64 {
        *self.collections.lock()
    }
}

#[async_trait]
impl HostProbe for ScriptedProbe {
    async fn sample(&self) -> anyhow::Result<HostMetrics> {
        let next = self.samples.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(metrics) = next {
            *last = metrics;
        }
        Ok(*last)
    }

    async fn request_collection(&self) -> anyhow::Result<()> {
        *self.collections.lock() += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingEventBus {
    events: Mutex<Vec<SystemEvent>>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SystemEvent> {
        self.events.lock().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.topic.clone()).collect()
    }
}

#[async_trait]
impl SystemEventBus for RecordingEventBus {
    async fn publish(&self, event: SystemEvent) -> anyhow::Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}
