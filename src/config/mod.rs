//! # Lifecycle Configuration
//!
//! Typed configuration for every component of the engine. Each section defaults
//! sensibly so a partial file (or none at all) still yields a usable config.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use feature_lifecycle::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_file("config/feature-lifecycle.toml")?;
//! let timeout = manager.config().orchestrator.operation_timeout();
//! # let _ = timeout;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub orchestrator: OrchestratorConfig,
    pub resolver: ResolverConfig,
    pub recovery: RecoveryConfig,
    pub cleanup: CleanupConfig,
    pub events: EventsConfig,
    pub maintenance: MaintenanceConfig,
}

/// Lifecycle operation execution
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Deadline for a whole enable/disable operation of one feature
    pub operation_timeout_ms: u64,
    /// Deadline for each individual stopper/store call
    pub collaborator_timeout_ms: u64,
    /// Default concurrency for best-effort bulk operations
    pub max_concurrency: usize,
    pub operation_history_limit: usize,
    pub default_actor: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 300_000,
            collaborator_timeout_ms: 60_000,
            max_concurrency: 4,
            operation_history_limit: 1_000,
            default_actor: "system".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub cache_enabled: bool,
    pub cache_ttl_seconds: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_seconds: 300,
        }
    }
}

impl ResolverConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

/// Error recovery and retry backoff
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub max_retry_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Fraction of the capped delay added as random jitter, 0.0 - 1.0
    pub jitter_factor: f64,
    pub action_timeout_ms: u64,
    pub max_history: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            action_timeout_ms: 30_000,
            max_history: 1_000,
        }
    }
}

impl RecoveryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Parent of every feature-scoped temp directory
    pub temp_root: PathBuf,
    pub snapshot_history_limit: usize,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir().join("feature-lifecycle"),
            snapshot_history_limit: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub max_history: usize,
    pub delivery_timeout_ms: u64,
    pub forward_to_system_bus: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            max_history: 1_000,
            delivery_timeout_ms: 5_000,
            forward_to_system_bus: true,
        }
    }
}

impl EventsConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

/// Periodic background tasks
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub cache_sweep_interval_seconds: u64,
    pub history_retention_interval_seconds: u64,
    /// Age beyond which history entries are dropped
    pub history_retention_seconds: u64,
    pub reference_prune_interval_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cache_sweep_interval_seconds: 60,
            history_retention_interval_seconds: 300,
            history_retention_seconds: 86_400,
            reference_prune_interval_seconds: 30,
        }
    }
}

impl MaintenanceConfig {
    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_seconds)
    }

    pub fn history_retention_interval(&self) -> Duration {
        Duration::from_secs(self.history_retention_interval_seconds)
    }

    pub fn history_retention(&self) -> Duration {
        Duration::from_secs(self.history_retention_seconds)
    }

    pub fn reference_prune_interval(&self) -> Duration {
        Duration::from_secs(self.reference_prune_interval_seconds)
    }
}

impl LifecycleConfig {
    /// Validate configuration for consistency
    pub fn validate(&self) -> ConfigResult<()> {
        let nonzero = [
            ("orchestrator.operation_timeout_ms", self.orchestrator.operation_timeout_ms),
            ("orchestrator.collaborator_timeout_ms", self.orchestrator.collaborator_timeout_ms),
            ("recovery.action_timeout_ms", self.recovery.action_timeout_ms),
            ("events.delivery_timeout_ms", self.events.delivery_timeout_ms),
            ("maintenance.cache_sweep_interval_seconds", self.maintenance.cache_sweep_interval_seconds),
            (
                "maintenance.history_retention_interval_seconds",
                self.maintenance.history_retention_interval_seconds,
            ),
            (
                "maintenance.reference_prune_interval_seconds",
                self.maintenance.reference_prune_interval_seconds,
            ),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(field, "0", "must be greater than 0"));
            }
        }

        let bounds = [
            ("orchestrator.operation_history_limit", self.orchestrator.operation_history_limit),
            ("orchestrator.max_concurrency", self.orchestrator.max_concurrency),
            ("recovery.max_history", self.recovery.max_history),
            ("cleanup.snapshot_history_limit", self.cleanup.snapshot_history_limit),
            ("events.max_history", self.events.max_history),
        ];
        for (field, value) in bounds {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(field, "0", "must be greater than 0"));
            }
        }

        if self.recovery.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "recovery.backoff_multiplier",
                self.recovery.backoff_multiplier.to_string(),
                "multiplier must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.recovery.jitter_factor) {
            return Err(ConfigurationError::invalid_value(
                "recovery.jitter_factor",
                self.recovery.jitter_factor.to_string(),
                "jitter factor must be within 0.0 and 1.0",
            ));
        }

        if self.recovery.base_delay_ms > self.recovery.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "recovery.base_delay_ms",
                self.recovery.base_delay_ms.to_string(),
                "base delay cannot exceed max_delay_ms",
            ));
        }

        if self.orchestrator.default_actor.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "orchestrator.default_actor",
                "orchestrator configuration",
            ));
        }

        Ok(())
    }
}
