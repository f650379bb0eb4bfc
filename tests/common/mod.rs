//! Shared fixtures for integration tests

#![allow(dead_code)] // Each test binary uses a different subset

pub mod strategies;

use feature_lifecycle::collaborators::memory::{InMemoryFeatureStore, MemoryStopper, RecordingEventBus};
use feature_lifecycle::config::LifecycleConfig;
use feature_lifecycle::models::{FeatureConfig, FeatureId, ResourceBindings, ResourceKind};
use feature_lifecycle::orchestration::LifecycleContext;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Short timeouts and near-zero backoff so recovery paths run quickly
pub fn fast_config(temp_root: &Path) -> LifecycleConfig {
    let mut config = LifecycleConfig::default();
    config.orchestrator.operation_timeout_ms = 10_000;
    config.orchestrator.collaborator_timeout_ms = 2_000;
    config.recovery.base_delay_ms = 1;
    config.recovery.max_delay_ms = 10;
    config.recovery.jitter_factor = 0.0;
    config.events.delivery_timeout_ms = 500;
    config.cleanup.temp_root = temp_root.to_path_buf();
    config
}

pub struct Harness {
    pub context: Arc<LifecycleContext>,
    pub store: Arc<InMemoryFeatureStore>,
    pub tasks: Arc<MemoryStopper>,
    pub agents: Arc<MemoryStopper>,
    pub services: Arc<MemoryStopper>,
    pub bus: Arc<RecordingEventBus>,
    _temp: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut LifecycleConfig)) -> Self {
        let temp = TempDir::new().expect("temp dir");
        let mut config = fast_config(temp.path());
        adjust(&mut config);

        let store = Arc::new(InMemoryFeatureStore::new());
        let tasks = Arc::new(MemoryStopper::new());
        let agents = Arc::new(MemoryStopper::new());
        let services = Arc::new(MemoryStopper::new());
        let bus = Arc::new(RecordingEventBus::new());

        let context = LifecycleContext::builder()
            .with_config(config)
            .with_store(store.clone())
            .with_stopper(ResourceKind::Task, tasks.clone())
            .with_stopper(ResourceKind::Agent, agents.clone())
            .with_stopper(ResourceKind::Service, services.clone())
            .with_system_bus(bus.clone())
            .build()
            .await
            .expect("context should build");

        Self {
            context: Arc::new(context),
            store,
            tasks,
            agents,
            services,
            bus,
            _temp: temp,
        }
    }

    pub async fn register(&self, config: FeatureConfig) {
        self.context
            .register_feature(config)
            .await
            .expect("register feature");
    }

    pub async fn register_with(&self, config: FeatureConfig, bindings: ResourceBindings) {
        self.context
            .register_feature_with_bindings(config, bindings)
            .await
            .expect("register feature");
    }
}

pub fn id(value: &str) -> FeatureId {
    FeatureId::from(value)
}

pub fn ids(values: &[&str]) -> Vec<FeatureId> {
    values.iter().map(|value| FeatureId::from(*value)).collect()
}
