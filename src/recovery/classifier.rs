//! # Error Classification
//!
//! Maps lifecycle failures onto a fixed set of categories that drive recovery policy.
//!
//! Typed errors anywhere in the `anyhow` chain win: [`LifecycleError`], `std::io::Error`
//! and tokio's `Elapsed` are recognised directly. Everything else falls back to
//! lowercase keyword matching on the rendered chain, which is best-effort by nature.

use crate::error::LifecycleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;

/// Primary error categories for recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Database,
    Service,
    Timeout,
    Resource,
    Permission,
    Configuration,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 8] = [
        Self::Network,
        Self::Database,
        Self::Service,
        Self::Timeout,
        Self::Resource,
        Self::Permission,
        Self::Configuration,
        Self::Unknown,
    ];

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::for_category(*self)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Database => write!(f, "database"),
            Self::Service => write!(f, "service"),
            Self::Timeout => write!(f, "timeout"),
            Self::Resource => write!(f, "resource"),
            Self::Permission => write!(f, "permission"),
            Self::Configuration => write!(f, "configuration"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Fixed severity per category
    pub fn for_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::Resource | ErrorCategory::Permission => Self::Critical,
            ErrorCategory::Database | ErrorCategory::Service => Self::High,
            ErrorCategory::Network | ErrorCategory::Timeout => Self::Medium,
            ErrorCategory::Configuration | ErrorCategory::Unknown => Self::Low,
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Trait for error classification strategies
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &anyhow::Error) -> ErrorCategory;

    /// Get the classifier name for identification
    fn classifier_name(&self) -> &'static str;
}

// Checked in order; timeouts first since they are often worded as network failures
const KEYWORDS: &[(ErrorCategory, &[&str])] = &[
    (ErrorCategory::Timeout, &["timeout", "timed out", "deadline exceeded"]),
    (
        ErrorCategory::Permission,
        &["permission", "access denied", "forbidden", "unauthorized", "not permitted"],
    ),
    (
        ErrorCategory::Network,
        &["connection", "network", "socket", "unreachable", "dns", "broken pipe"],
    ),
    (
        ErrorCategory::Database,
        &["database", "sql", "deadlock", "transaction", "constraint"],
    ),
    (
        ErrorCategory::Resource,
        &["out of memory", "memory", "disk", "no space", "too many open files", "exhausted", "quota"],
    ),
    (
        ErrorCategory::Configuration,
        &["config", "invalid setting", "missing key", "not configured"],
    ),
    (
        ErrorCategory::Service,
        &["service", "unavailable", "agent", "503", "refused to stop"],
    ),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardErrorClassifier;

impl StandardErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Keyword heuristics over a message
    pub fn classify_message(message: &str) -> ErrorCategory {
        let lowered = message.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|word| lowered.contains(word)))
            .map(|(category, _)| *category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    fn classify_lifecycle(error: &LifecycleError) -> Option<ErrorCategory> {
        match error {
            LifecycleError::OperationTimeout { .. } => Some(ErrorCategory::Timeout),
            LifecycleError::StageFailure { category, .. } => Some(*category),
            LifecycleError::MissingDependency { .. }
            | LifecycleError::CircularDependency { .. }
            | LifecycleError::ConflictDetected { .. }
            | LifecycleError::FeatureNotFound(_)
            | LifecycleError::Configuration(_) => Some(ErrorCategory::Configuration),
            LifecycleError::RollbackFailure { .. } => Some(ErrorCategory::Service),
            // Collaborator messages carry no type information
            LifecycleError::Collaborator(_) | LifecycleError::StateMachine(_) => None,
        }
    }

    fn classify_io(error: &std::io::Error) -> Option<ErrorCategory> {
        match error.kind() {
            ErrorKind::TimedOut => Some(ErrorCategory::Timeout),
            ErrorKind::PermissionDenied => Some(ErrorCategory::Permission),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::AddrInUse
            | ErrorKind::AddrNotAvailable
            | ErrorKind::BrokenPipe => Some(ErrorCategory::Network),
            ErrorKind::OutOfMemory => Some(ErrorCategory::Resource),
            _ => None,
        }
    }
}

impl ErrorClassifier for StandardErrorClassifier {
    fn classify(&self, error: &anyhow::Error) -> ErrorCategory {
        for cause in error.chain() {
            let typed = if let Some(lifecycle) = cause.downcast_ref::<LifecycleError>() {
                Self::classify_lifecycle(lifecycle)
            } else if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                Self::classify_io(io)
            } else if cause.is::<tokio::time::error::Elapsed>() {
                Some(ErrorCategory::Timeout)
            } else {
                None
            };
            if let Some(category) = typed {
                return category;
            }
        }
        Self::classify_message(&format!("{error:#}"))
    }

    fn classifier_name(&self) -> &'static str {
        "standard"
    }
}
