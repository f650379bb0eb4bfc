//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate. Sources are layered, later
//! ones overriding earlier ones:
//!
//! 1. the base file (e.g. `feature-lifecycle.toml`), optional
//! 2. an environment overlay next to it (`feature-lifecycle.production.toml`), optional
//! 3. environment variables such as `FEATURE_LIFECYCLE__RECOVERY__MAX_RETRY_ATTEMPTS=5`

use super::error::{ConfigResult, ConfigurationError};
use super::LifecycleConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "FEATURE_LIFECYCLE";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: LifecycleConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_file_with_env(path, &environment)
    }

    /// Load configuration with an explicit environment name
    pub fn load_from_file_with_env(
        path: impl AsRef<Path>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        let overlay = Self::overlay_path(path, environment);

        debug!(
            base = %path.display(),
            overlay = %overlay.display(),
            environment,
            "Loading lifecycle configuration"
        );

        let settings = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(config::File::from(overlay).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(path.display().to_string(), e))?;

        let config: LifecycleConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::load_error(path.display().to_string(), e))?;

        config.validate()?;

        info!(
            environment,
            operation_timeout_ms = config.orchestrator.operation_timeout_ms,
            max_retry_attempts = config.recovery.max_retry_attempts,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: LifecycleConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
        }))
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Detect environment from environment variables
    pub fn detect_environment() -> String {
        env::var("FEATURE_LIFECYCLE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    /// `dir/name.toml` -> `dir/name.<env>.toml`
    fn overlay_path(path: &Path, environment: &str) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "feature-lifecycle".to_string());
        let extension = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "toml".to_string());
        path.with_file_name(format!("{stem}.{environment}.{extension}"))
    }
}
