//! # Error Recovery
//!
//! Failure classification, retry backoff and the recovery manager that turns a
//! classified failure into an ordered sequence of remediation attempts.

pub mod backoff;
pub mod classifier;
pub mod manager;

pub use backoff::{BackoffCalculator, BackoffConfig};
pub use classifier::{ErrorCategory, ErrorClassifier, ErrorSeverity, StandardErrorClassifier};
pub use manager::{
    ActionAttempt, ErrorRecord, ErrorRecoveryManager, RecoveryAction, RecoveryContext,
    RecoveryDirective, RecoveryHandler, RecoverySession, RecoveryStatistics, RecoveryStatus,
    RecoveryStrategy,
};
