//! Error types for the self-healing engine.
//!
//! This module defines a hierarchical error system:
//! - [`AppError`]: Top-level application errors
//! - [`ConfigError`]: Configuration errors
//! - [`StorageError`]: Knowledge store persistence errors
//! - [`AnalysisError`]: Failures inside a single diagnosis analyzer
//! - [`RecoveryError`]: Recovery engine errors
//! - [`ActionError`]: Failures of a single recovery action
//!
//! All errors implement `Send + Sync` for async compatibility.

use thiserror::Error;

/// Top-level application error.
///
/// This is the main error type returned by the binary and the orchestrator.
/// It wraps all subsystem errors for unified error handling.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Analysis error.
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// Recovery error.
    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    /// Malformed incident input.
    #[error("Invalid incident: {message}")]
    InvalidIncident {
        /// Description of what's invalid.
        message: String,
    },
}

/// Configuration errors.
///
/// These errors represent failures in configuration loading and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// Storage errors.
///
/// These errors represent failures of a knowledge store backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Failed to connect to the database.
    #[error("Database connection failed: {message}")]
    ConnectionFailed {
        /// Description of the connection failure.
        message: String,
    },

    /// A database query failed.
    #[error("Query failed: {query} - {message}")]
    QueryFailed {
        /// The query that failed (may be truncated).
        query: String,
        /// Description of the failure.
        message: String,
    },

    /// Database migration failed.
    #[error("Migration failed: {version} - {message}")]
    MigrationFailed {
        /// The migration version that failed.
        version: String,
        /// Description of the failure.
        message: String,
    },

    /// Stored data could not be encoded or decoded.
    #[error("Serialization failed: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// Historical incident not found.
    #[error("Incident not found: {incident_id}")]
    IncidentNotFound {
        /// The incident ID that was not found.
        incident_id: String,
    },

    /// Internal storage error.
    #[error("Internal storage error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

/// Analyzer errors.
///
/// Never surfaced from `diagnose`; the engine absorbs them into a
/// zero-confidence result and logs them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// The analyzer did not finish before the deadline.
    #[error("{analyzer} analysis timed out after {elapsed_ms}ms")]
    Timeout {
        /// Analyzer name.
        analyzer: String,
        /// Elapsed time in milliseconds.
        elapsed_ms: u64,
    },

    /// The caller cancelled the diagnosis.
    #[error("{analyzer} analysis cancelled")]
    Cancelled {
        /// Analyzer name.
        analyzer: String,
    },

    /// The analyzer task panicked or was aborted.
    #[error("{analyzer} analysis task failed: {message}")]
    TaskFailed {
        /// Analyzer name.
        analyzer: String,
        /// Join error description.
        message: String,
    },

    /// Shared analyzer state was poisoned by a panicking writer.
    #[error("{analyzer} state lock poisoned")]
    LockPoisoned {
        /// Analyzer name.
        analyzer: String,
    },
}

/// Recovery engine errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    /// No registered strategy can handle the diagnosed root cause.
    #[error("No applicable recovery strategy for root cause: {root_cause}")]
    NoApplicableStrategy {
        /// The diagnosed root cause.
        root_cause: String,
    },

    /// A strategy failed to build a plan.
    #[error("Strategy {strategy} failed to build a plan: {message}")]
    PlanCreation {
        /// Strategy name.
        strategy: String,
        /// Description of the failure.
        message: String,
    },

    /// A single step exceeded its timeout on every attempt.
    #[error("Step {step} timed out after {timeout_ms}ms")]
    StepTimeout {
        /// Step name.
        step: String,
        /// Per-attempt timeout in milliseconds.
        timeout_ms: u64,
    },

    /// A critical step failed and the remaining steps were skipped.
    #[error("Execution aborted at critical step {step}: {message}")]
    ExecutionAborted {
        /// Step name.
        step: String,
        /// Description of the failure.
        message: String,
    },

    /// Compensating actions failed or timed out.
    #[error("Rollback failed for operation {operation_id}: {message}")]
    RollbackFailed {
        /// Operation ID.
        operation_id: String,
        /// Description of the failure.
        message: String,
    },

    /// An operation attempted an illegal state change.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },
}

impl RecoveryError {
    /// Returns true if the failure needs an operator.
    ///
    /// A missing strategy and a failed rollback leave the system
    /// without further automated options.
    #[must_use]
    pub const fn requires_operator(&self) -> bool {
        matches!(
            self,
            Self::NoApplicableStrategy { .. } | Self::RollbackFailed { .. }
        )
    }
}

/// Errors reported by an action executor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The action ran and failed.
    #[error("Action {action} failed: {message}")]
    Failed {
        /// Action identifier.
        action: String,
        /// Description of the failure.
        message: String,
    },

    /// The action failed in a way worth retrying.
    #[error("Action {action} failed transiently: {message}")]
    Transient {
        /// Action identifier.
        action: String,
        /// Description of the failure.
        message: String,
    },

    /// No executor is registered for the action.
    #[error("Unsupported action: {action}")]
    Unsupported {
        /// Action identifier.
        action: String,
    },

    /// The action cannot be compensated.
    #[error("Action {action} is not reversible")]
    NotReversible {
        /// Action identifier.
        action: String,
    },
}

impl ActionError {
    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
