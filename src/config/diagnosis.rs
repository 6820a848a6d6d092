//! Diagnosis engine configuration.
//!
//! # Example
//!
//! ```
//! use self_healing::config::DiagnosisConfig;
//!
//! let config = DiagnosisConfig::default();
//! assert!(config.enable_ml_diagnosis);
//! assert!((config.fusion.ml - 0.4).abs() < f64::EPSILON);
//! ```

use std::time::Duration;

use super::{parse_env_bool, parse_env_f64, parse_env_millis, parse_env_u64, parse_env_usize};
use crate::error::ConfigError;

/// Default: analysis deadline per diagnosis call (1 minute).
pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(60);

/// Default: minimum diagnosis confidence before automated recovery starts.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Default: minimum symptom similarity for a pattern match.
pub const DEFAULT_PATTERN_MATCH_THRESHOLD: f64 = 0.8;

/// Default: newest log entries the log analyzer looks at.
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 10_000;

/// Default: interval of the continuous learning loop (1 hour).
pub const DEFAULT_LEARNING_INTERVAL_SECS: u64 = 3600;

/// Per-analyzer fusion weights.
///
/// An analyzer contributes its weight to the fused confidence only when
/// its own confidence exceeds `gate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    /// ML classifier weight.
    pub ml: f64,
    /// Log analyzer weight.
    pub log: f64,
    /// Pattern recognizer weight.
    pub pattern: f64,
    /// Root-cause analyzer weight.
    pub root_cause: f64,
    /// Confidence an analyzer must exceed to contribute.
    pub gate: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            ml: 0.4,
            log: 0.2,
            pattern: 0.2,
            root_cause: 0.2,
            gate: 0.5,
        }
    }
}

/// Diagnosis engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisConfig {
    /// Deadline for one `diagnose` call.
    pub analysis_timeout: Duration,
    /// Minimum confidence to hand a diagnosis to the recovery engine.
    pub confidence_threshold: f64,
    /// Minimum similarity for a failure pattern to match.
    pub pattern_match_threshold: f64,
    /// Newest log entries kept per diagnosis.
    pub max_log_entries: usize,
    /// Run the ML classifier.
    pub enable_ml_diagnosis: bool,
    /// Run the log analyzer.
    pub enable_log_analysis: bool,
    /// Run the pattern recognizer.
    pub enable_pattern_matching: bool,
    /// Run the root-cause analyzer.
    pub enable_root_cause_analysis: bool,
    /// Interval of the background learning loop.
    pub learning_interval: Duration,
    /// Fusion weights and gate.
    pub fusion: FusionWeights,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            pattern_match_threshold: DEFAULT_PATTERN_MATCH_THRESHOLD,
            max_log_entries: DEFAULT_MAX_LOG_ENTRIES,
            enable_ml_diagnosis: true,
            enable_log_analysis: true,
            enable_pattern_matching: true,
            enable_root_cause_analysis: true,
            learning_interval: Duration::from_secs(DEFAULT_LEARNING_INTERVAL_SECS),
            fusion: FusionWeights::default(),
        }
    }
}

impl DiagnosisConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HEALING_ANALYSIS_TIMEOUT_MS` (default: 60000)
    /// - `HEALING_CONFIDENCE_THRESHOLD` (default: 0.6)
    /// - `HEALING_PATTERN_MATCH_THRESHOLD` (default: 0.8)
    /// - `HEALING_MAX_LOG_ENTRIES` (default: 10000)
    /// - `HEALING_ENABLE_ML_DIAGNOSIS` (default: true)
    /// - `HEALING_ENABLE_LOG_ANALYSIS` (default: true)
    /// - `HEALING_ENABLE_PATTERN_MATCHING` (default: true)
    /// - `HEALING_ENABLE_ROOT_CAUSE_ANALYSIS` (default: true)
    /// - `HEALING_LEARNING_INTERVAL_SECS` (default: 3600)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            analysis_timeout: parse_env_millis(
                "HEALING_ANALYSIS_TIMEOUT_MS",
                DEFAULT_ANALYSIS_TIMEOUT,
            )?,
            confidence_threshold: parse_env_f64(
                "HEALING_CONFIDENCE_THRESHOLD",
                DEFAULT_CONFIDENCE_THRESHOLD,
            )?,
            pattern_match_threshold: parse_env_f64(
                "HEALING_PATTERN_MATCH_THRESHOLD",
                DEFAULT_PATTERN_MATCH_THRESHOLD,
            )?,
            max_log_entries: parse_env_usize(
                "HEALING_MAX_LOG_ENTRIES",
                DEFAULT_MAX_LOG_ENTRIES,
            )?,
            enable_ml_diagnosis: parse_env_bool("HEALING_ENABLE_ML_DIAGNOSIS", true)?,
            enable_log_analysis: parse_env_bool("HEALING_ENABLE_LOG_ANALYSIS", true)?,
            enable_pattern_matching: parse_env_bool("HEALING_ENABLE_PATTERN_MATCHING", true)?,
            enable_root_cause_analysis: parse_env_bool(
                "HEALING_ENABLE_ROOT_CAUSE_ANALYSIS",
                true,
            )?,
            learning_interval: Duration::from_secs(parse_env_u64(
                "HEALING_LEARNING_INTERVAL_SECS",
                DEFAULT_LEARNING_INTERVAL_SECS,
            )?),
            fusion: FusionWeights::default(),
        })
    }
}
