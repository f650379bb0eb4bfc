//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console, plus an optional JSON file
//! sink when `FEATURE_LIFECYCLE_LOG_DIR` is set.

use chrono::Utc;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.clone()))
        };

        let log_dir = std::env::var("FEATURE_LIFECYCLE_LOG_DIR").ok().map(PathBuf::from);
        let mut guard_rejected = false;
        let file_layer = log_dir.as_ref().and_then(|dir| {
            std::fs::create_dir_all(dir).ok()?;
            let filename = format!(
                "{}.{}.{}.log",
                environment,
                process::id(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, filename));
            guard_rejected = !retain_guard(&FILE_GUARD, guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(filter()),
            )
        });

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_filter(filter()),
            )
            .with(file_layer);

        // An existing global subscriber (e.g. installed by the host) is fine
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }
        if guard_rejected {
            tracing::debug!("File writer guard already held; the new file sink is not flushed on exit");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_dir = ?log_dir,
            "Structured logging initialized"
        );
    });
}

/// Keep the file writer's guard alive for the process; false if one is already held
fn retain_guard(cell: &OnceLock<WorkerGuard>, guard: WorkerGuard) -> bool {
    cell.set(guard).is_ok()
}

fn get_environment() -> String {
    std::env::var("FEATURE_LIFECYCLE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for a feature-level lifecycle operation
pub fn log_feature_operation(
    operation: &str,
    feature_id: &str,
    operation_id: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        feature_id = %feature_id,
        operation_id = operation_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "FEATURE_OPERATION"
    );
}

/// Log a stage transition inside a lifecycle operation
pub fn log_stage_transition(
    feature_id: &str,
    operation_id: &str,
    from_stage: &str,
    to_stage: &str,
    duration_ms: Option<u64>,
) {
    tracing::debug!(
        feature_id = %feature_id,
        operation_id = %operation_id,
        from_stage = %from_stage,
        to_stage = %to_stage,
        duration_ms = duration_ms,
        "STAGE_TRANSITION"
    );
}

/// Log one recovery action attempt
pub fn log_recovery_attempt(
    feature_id: &str,
    category: &str,
    action: &str,
    succeeded: bool,
    details: Option<&str>,
) {
    if succeeded {
        tracing::info!(
            feature_id = %feature_id,
            category = %category,
            action = %action,
            succeeded,
            details = details,
            "RECOVERY_ATTEMPT"
        );
    } else {
        tracing::warn!(
            feature_id = %feature_id,
            category = %category,
            action = %action,
            succeeded,
            details = details,
            "RECOVERY_ATTEMPT"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_second_file_guard_is_reported() {
        let cell = OnceLock::new();
        let (_, first) = tracing_appender::non_blocking(std::io::sink());
        let (_, second) = tracing_appender::non_blocking(std::io::sink());
        assert!(retain_guard(&cell, first));
        assert!(!retain_guard(&cell, second));
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_feature_operation("disable", "a", None, "started", None);
    }
}
