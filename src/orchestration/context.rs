//! # Lifecycle Context
//!
//! Owner of the graph registry, resolver, tracker, cleanup and recovery managers,
//! broadcaster and orchestrator. Hosts build exactly one and pass it around; nothing
//! in the crate is global.
//!
//! ```rust,no_run
//! use feature_lifecycle::collaborators::memory::{InMemoryFeatureStore, MemoryStopper};
//! use feature_lifecycle::models::{FeatureConfig, FeatureId, ResourceKind};
//! use feature_lifecycle::orchestration::{BulkStrategy, LifecycleContext, OperationOptions};
//! use std::sync::Arc;
//!
//! # async fn example() -> feature_lifecycle::LifecycleResult<()> {
//! let context = LifecycleContext::builder()
//!     .with_store(Arc::new(InMemoryFeatureStore::new()))
//!     .with_stopper(ResourceKind::Agent, Arc::new(MemoryStopper::new()))
//!     .build()
//!     .await?;
//!
//! context.register_feature(FeatureConfig::new("risk_monitor")).await?;
//! context.register_feature(FeatureConfig::new("momentum").requires("risk_monitor")).await?;
//!
//! let result = context
//!     .enable_features(&[FeatureId::from("momentum")], true, BulkStrategy::Sequential, &OperationOptions::new())
//!     .await;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

use super::bulk::{BulkOperationResult, BulkStrategy};
use super::maintenance::{MaintenanceJobs, MaintenanceScheduler};
use super::orchestrator::{LifecycleOrchestrator, OperationOptions, OperationOutcome};
use crate::collaborators::memory::InMemoryFeatureStore;
use crate::collaborators::{CacheInvalidator, FeatureStore, HostProbe, ResourceStopper, SystemEventBus};
use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::events::EventBroadcaster;
use crate::graph::{
    DependencyGraph, DependencyResolver, FeatureGraphRegistry, FeatureImpact, FeatureValidation,
    ResolutionResult,
};
use crate::models::{AuditAction, AuditEntry, FeatureConfig, FeatureId, FeatureStatus, ResourceBindings, ResourceKind};
use crate::recovery::{ErrorClassifier, ErrorRecoveryManager};
use crate::resources::{CleanupManager, ResourceTracker};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Default)]
pub struct LifecycleContextBuilder {
    config: LifecycleConfig,
    store: Option<Arc<dyn FeatureStore>>,
    stoppers: HashMap<ResourceKind, Arc<dyn ResourceStopper>>,
    cache: Option<Arc<dyn CacheInvalidator>>,
    probe: Option<Arc<dyn HostProbe>>,
    system_bus: Option<Arc<dyn SystemEventBus>>,
    classifier: Option<Arc<dyn ErrorClassifier>>,
}

impl LifecycleContextBuilder {
    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn FeatureStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_stopper(mut self, kind: ResourceKind, stopper: Arc<dyn ResourceStopper>) -> Self {
        self.stoppers.insert(kind, stopper);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheInvalidator>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HostProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_system_bus(mut self, bus: Arc<dyn SystemEventBus>) -> Self {
        self.system_bus = Some(bus);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Validate the configuration, wire every component and load the graph from the store
    pub async fn build(self) -> LifecycleResult<LifecycleContext> {
        self.config.validate()?;
        let config = self.config;

        let store: Arc<dyn FeatureStore> = match self.store {
            Some(store) => store,
            None => Arc::new(InMemoryFeatureStore::new()),
        };
        let graphs = Arc::new(FeatureGraphRegistry::new());
        let resolver = Arc::new(if config.resolver.cache_enabled {
            DependencyResolver::with_cache(config.resolver.cache_ttl())
        } else {
            DependencyResolver::new()
        });

        let tracker = Arc::new(ResourceTracker::new());
        let mut cleanup = CleanupManager::new(
            Arc::clone(&tracker),
            config.cleanup.temp_root.clone(),
            config.cleanup.snapshot_history_limit,
        );
        if let Some(cache) = self.cache {
            cleanup = cleanup.with_cache(cache);
        }
        if let Some(probe) = self.probe {
            cleanup = cleanup.with_probe(probe);
        }
        let cleanup = Arc::new(cleanup);

        let recovery = Arc::new(match self.classifier {
            Some(classifier) => ErrorRecoveryManager::with_classifier(config.recovery.clone(), classifier),
            None => ErrorRecoveryManager::new(config.recovery.clone()),
        });

        let mut events = EventBroadcaster::new(config.events.clone());
        if let Some(bus) = self.system_bus {
            events = events.with_system_bus(bus);
        }
        let events = Arc::new(events);

        let mut orchestrator = LifecycleOrchestrator::new(
            config.orchestrator.clone(),
            Arc::clone(&store),
            Arc::clone(&graphs),
            Arc::clone(&resolver),
            Arc::clone(&cleanup),
            Arc::clone(&recovery),
            Arc::clone(&events),
        );
        for (kind, stopper) in self.stoppers {
            orchestrator = orchestrator.with_stopper(kind, stopper);
        }

        let graph = graphs.rebuild_from_store(store.as_ref()).await?;
        info!(features = graph.len(), "Lifecycle context ready");

        Ok(LifecycleContext {
            config,
            store,
            graphs,
            resolver,
            tracker,
            cleanup,
            recovery,
            events,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

pub struct LifecycleContext {
    config: LifecycleConfig,
    store: Arc<dyn FeatureStore>,
    graphs: Arc<FeatureGraphRegistry>,
    resolver: Arc<DependencyResolver>,
    tracker: Arc<ResourceTracker>,
    cleanup: Arc<CleanupManager>,
    recovery: Arc<ErrorRecoveryManager>,
    events: Arc<EventBroadcaster>,
    orchestrator: Arc<LifecycleOrchestrator>,
}

impl std::fmt::Debug for LifecycleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleContext")
            .field("features", &self.graphs.snapshot().len())
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

impl LifecycleContext {
    pub fn builder() -> LifecycleContextBuilder {
        LifecycleContextBuilder::default()
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn FeatureStore> {
        &self.store
    }

    pub fn graph(&self) -> Arc<DependencyGraph> {
        self.graphs.snapshot()
    }

    pub fn resolver(&self) -> &Arc<DependencyResolver> {
        &self.resolver
    }

    pub fn tracker(&self) -> &Arc<ResourceTracker> {
        &self.tracker
    }

    pub fn cleanup(&self) -> &Arc<CleanupManager> {
        &self.cleanup
    }

    pub fn recovery(&self) -> &Arc<ErrorRecoveryManager> {
        &self.recovery
    }

    pub fn events(&self) -> &Arc<EventBroadcaster> {
        &self.events
    }

    pub fn orchestrator(&self) -> &Arc<LifecycleOrchestrator> {
        &self.orchestrator
    }

    /// Persist a feature configuration and rebuild the graph
    #[instrument(skip(self, config), fields(feature_id = %config.feature_id))]
    pub async fn register_feature(&self, config: FeatureConfig) -> LifecycleResult<()> {
        self.store
            .put_config(&config)
            .await
            .map_err(|e| LifecycleError::collaborator(&e))?;
        self.audit(AuditEntry::new(
            config.feature_id.clone(),
            AuditAction::Register,
            self.config.orchestrator.default_actor.clone(),
        ))
        .await?;
        self.graphs.rebuild_from_store(self.store.as_ref()).await?;
        Ok(())
    }

    /// Register a feature together with the resources it owns
    pub async fn register_feature_with_bindings(
        &self,
        config: FeatureConfig,
        bindings: ResourceBindings,
    ) -> LifecycleResult<()> {
        let feature_id = config.feature_id.clone();
        self.register_feature(config).await?;
        self.orchestrator.register_bindings(feature_id, bindings);
        Ok(())
    }

    /// Remove a feature's configuration and rebuild the graph.
    ///
    /// Returns false when the feature was not registered.
    #[instrument(skip(self), fields(feature_id = %feature_id))]
    pub async fn unregister_feature(&self, feature_id: &FeatureId) -> LifecycleResult<bool> {
        let removed = self
            .store
            .remove_config(feature_id)
            .await
            .map_err(|e| LifecycleError::collaborator(&e))?;
        if !removed {
            return Ok(false);
        }
        self.orchestrator.remove_bindings(feature_id);
        self.audit(AuditEntry::new(
            feature_id.clone(),
            AuditAction::Unregister,
            self.config.orchestrator.default_actor.clone(),
        ))
        .await?;
        self.graphs.rebuild_from_store(self.store.as_ref()).await?;
        Ok(true)
    }

    pub fn resolve_enable_order(&self, ids: &[FeatureId], include_dependencies: bool) -> ResolutionResult {
        self.resolver
            .resolve_enable_order(&self.graphs.snapshot(), ids, include_dependencies)
    }

    pub fn resolve_disable_order(&self, ids: &[FeatureId], cascade: bool) -> ResolutionResult {
        self.resolver
            .resolve_disable_order(&self.graphs.snapshot(), ids, cascade)
    }

    /// Check a feature against the live states of its neighbours
    pub async fn validate_feature_state(&self, feature_id: &FeatureId) -> LifecycleResult<FeatureValidation> {
        let states = self.load_states().await?;
        Ok(self
            .resolver
            .validate_feature_state(&self.graphs.snapshot(), feature_id, &states))
    }

    pub async fn get_feature_impact(&self, feature_id: &FeatureId) -> LifecycleResult<FeatureImpact> {
        let states = self.load_states().await?;
        Ok(self
            .resolver
            .get_feature_impact(&self.graphs.snapshot(), feature_id, &states))
    }

    pub async fn feature_status(&self, feature_id: &FeatureId) -> LifecycleResult<FeatureStatus> {
        let state = self
            .store
            .get_state(feature_id)
            .await
            .map_err(|e| LifecycleError::collaborator(&e))?;
        Ok(state.map(|s| s.status).unwrap_or_default())
    }

    pub async fn enable_feature(
        &self,
        feature_id: &FeatureId,
        options: &OperationOptions,
    ) -> LifecycleResult<OperationOutcome> {
        self.orchestrator.activate_feature(feature_id, options).await
    }

    pub async fn disable_feature(
        &self,
        feature_id: &FeatureId,
        options: &OperationOptions,
    ) -> LifecycleResult<OperationOutcome> {
        self.orchestrator.deactivate_feature(feature_id, options).await
    }

    /// Bulk enable using the configured concurrency for best-effort runs
    pub async fn enable_features(
        &self,
        ids: &[FeatureId],
        include_dependencies: bool,
        strategy: BulkStrategy,
        options: &OperationOptions,
    ) -> BulkOperationResult {
        self.orchestrator
            .enable_features(
                ids,
                include_dependencies,
                strategy,
                self.config.orchestrator.max_concurrency,
                options,
            )
            .await
    }

    pub async fn disable_features(
        &self,
        ids: &[FeatureId],
        cascade: bool,
        strategy: BulkStrategy,
        options: &OperationOptions,
    ) -> BulkOperationResult {
        self.orchestrator
            .disable_features(
                ids,
                cascade,
                strategy,
                self.config.orchestrator.max_concurrency,
                options,
            )
            .await
    }

    /// Start the background maintenance tasks; dropping the returned scheduler does not
    /// stop them, call [`MaintenanceScheduler::shutdown`]
    pub fn start_maintenance(&self) -> MaintenanceScheduler {
        let resolver = Arc::clone(&self.resolver);
        let tracker = Arc::clone(&self.tracker);
        let events = Arc::clone(&self.events);
        let recovery = Arc::clone(&self.recovery);
        let cleanup = Arc::clone(&self.cleanup);
        let orchestrator = Arc::clone(&self.orchestrator);

        MaintenanceScheduler::start(
            &self.config.maintenance,
            MaintenanceJobs {
                sweep_cache: Arc::new(move || resolver.sweep_cache()),
                retain_history: Arc::new(move |older_than| {
                    events.prune_history(older_than)
                        + recovery.prune_history(older_than)
                        + cleanup.prune_history(older_than)
                        + orchestrator.prune_history(older_than)
                }),
                prune_references: Arc::new(move || tracker.prune_dead_references()),
            },
        )
    }

    async fn load_states(&self) -> LifecycleResult<HashMap<FeatureId, FeatureStatus>> {
        let states = self
            .store
            .list_states()
            .await
            .map_err(|e| LifecycleError::collaborator(&e))?;
        Ok(states
            .into_iter()
            .map(|state| (state.feature_id, state.status))
            .collect())
    }

    async fn audit(&self, entry: AuditEntry) -> LifecycleResult<()> {
        self.store
            .append_audit(&entry)
            .await
            .map_err(|e| LifecycleError::collaborator(&e))
    }
}
