//! Recovery engine configuration.

use std::time::Duration;

use super::{parse_env_bool, parse_env_f64, parse_env_millis, parse_env_u32};
use crate::error::ConfigError;

/// Default: concurrently executing recovery operations.
pub const DEFAULT_MAX_CONCURRENT_RECOVERIES: u32 = 3;

/// Default: deadline for a whole recovery operation (10 minutes).
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(600);

/// Default: deadline for the rollback pass (5 minutes).
pub const DEFAULT_ROLLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Default: retries per step after a timeout or transient failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default: base delay between step retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default: recovery rate needed for a `completed` operation.
pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 0.8;

/// Default: failed-step ratio that triggers rollback.
pub const DEFAULT_ROLLBACK_THRESHOLD: f64 = 0.5;

/// Recovery engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
    /// Admission bound on concurrently executing operations.
    pub max_concurrent_recoveries: u32,
    /// Deadline for a whole operation.
    pub recovery_timeout: Duration,
    /// Deadline for the rollback pass.
    pub rollback_timeout: Duration,
    /// Retries per step.
    pub max_retries: u32,
    /// Base retry delay; attempt `n` waits `n * retry_delay`.
    pub retry_delay: Duration,
    /// Feed outcomes back to the diagnosis engine.
    pub enable_learning: bool,
    /// Compensate applied steps after majority failure.
    pub enable_rollback: bool,
    /// Recovery rate needed for a `completed` operation.
    pub success_threshold: f64,
    /// Failed-step ratio that triggers rollback.
    pub rollback_threshold: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_recoveries: DEFAULT_MAX_CONCURRENT_RECOVERIES,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            rollback_timeout: DEFAULT_ROLLBACK_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            enable_learning: true,
            enable_rollback: true,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            rollback_threshold: DEFAULT_ROLLBACK_THRESHOLD,
        }
    }
}

impl RecoveryConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HEALING_MAX_CONCURRENT_RECOVERIES` (default: 3)
    /// - `HEALING_RECOVERY_TIMEOUT_MS` (default: 600000)
    /// - `HEALING_ROLLBACK_TIMEOUT_MS` (default: 300000)
    /// - `HEALING_MAX_RETRIES` (default: 3)
    /// - `HEALING_RETRY_DELAY_MS` (default: 1000)
    /// - `HEALING_ENABLE_LEARNING` (default: true)
    /// - `HEALING_ENABLE_ROLLBACK` (default: true)
    /// - `HEALING_SUCCESS_THRESHOLD` (default: 0.8)
    /// - `HEALING_ROLLBACK_THRESHOLD` (default: 0.5)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_concurrent_recoveries: parse_env_u32(
                "HEALING_MAX_CONCURRENT_RECOVERIES",
                DEFAULT_MAX_CONCURRENT_RECOVERIES,
            )?,
            recovery_timeout: parse_env_millis(
                "HEALING_RECOVERY_TIMEOUT_MS",
                DEFAULT_RECOVERY_TIMEOUT,
            )?,
            rollback_timeout: parse_env_millis(
                "HEALING_ROLLBACK_TIMEOUT_MS",
                DEFAULT_ROLLBACK_TIMEOUT,
            )?,
            max_retries: parse_env_u32("HEALING_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_delay: parse_env_millis("HEALING_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY)?,
            enable_learning: parse_env_bool("HEALING_ENABLE_LEARNING", true)?,
            enable_rollback: parse_env_bool("HEALING_ENABLE_ROLLBACK", true)?,
            success_threshold: parse_env_f64(
                "HEALING_SUCCESS_THRESHOLD",
                DEFAULT_SUCCESS_THRESHOLD,
            )?,
            rollback_threshold: parse_env_f64(
                "HEALING_ROLLBACK_THRESHOLD",
                DEFAULT_ROLLBACK_THRESHOLD,
            )?,
        })
    }
}
