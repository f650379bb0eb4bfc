//! # Collaborator Contracts
//!
//! The engine never persists anything or terminates real resources itself. Hosts wire
//! in implementations of these traits; [`memory`] has in-process versions for tests
//! and embedding.
//!
//! Every method is a suspension point and returns `anyhow::Result` so adapters can
//! surface whatever error type their technology produces; the recovery classifier
//! inspects the chain.

pub mod memory;

use crate::models::{AuditEntry, FeatureConfig, FeatureId, FeatureState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistence of feature configuration, state and the audit trail
#[async_trait]
pub trait FeatureStore: Send + Sync {
    async fn get_config(&self, feature_id: &FeatureId) -> anyhow::Result<Option<FeatureConfig>>;

    async fn put_config(&self, config: &FeatureConfig) -> anyhow::Result<()>;

    /// Returns whether a configuration was removed
    async fn remove_config(&self, feature_id: &FeatureId) -> anyhow::Result<bool>;

    async fn list_configs(&self) -> anyhow::Result<Vec<FeatureConfig>>;

    async fn get_state(&self, feature_id: &FeatureId) -> anyhow::Result<Option<FeatureState>>;

    async fn put_state(&self, state: &FeatureState) -> anyhow::Result<()>;

    async fn list_states(&self) -> anyhow::Result<Vec<FeatureState>>;

    async fn append_audit(&self, entry: &AuditEntry) -> anyhow::Result<()>;
}

/// Stops and restarts one kind of resource (tasks, agents or services)
#[async_trait]
pub trait ResourceStopper: Send + Sync {
    /// Stop `resource_ids`, returning the ids that were actually stopped
    async fn stop(&self, feature_id: &FeatureId, resource_ids: &[String]) -> anyhow::Result<Vec<String>>;

    /// Bring previously stopped resources back during rollback
    async fn restart(&self, resource_ids: &[String]) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// Returns whether the key was present
    async fn invalidate(&self, key: &str) -> anyhow::Result<bool>;
}

/// Point-in-time host resource usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMetrics {
    pub memory_bytes: u64,
    pub open_handles: u64,
    pub thread_count: u64,
    pub temp_file_count: u64,
    pub disk_usage_bytes: u64,
}

#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn sample(&self) -> anyhow::Result<HostMetrics>;

    /// Hint that now is a good time to reclaim memory; best-effort
    async fn request_collection(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Event as forwarded to the wider platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemEvent {
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait SystemEventBus: Send + Sync {
    async fn publish(&self, event: SystemEvent) -> anyhow::Result<()>;
}
