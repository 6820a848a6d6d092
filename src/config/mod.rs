//! Configuration management.
//!
//! This module handles:
//! - Environment variable loading (including a `.env` file)
//! - Configuration validation
//! - Default value handling
//!
//! # Example
//!
//! ```
//! use self_healing::config::{DiagnosisConfig, HealingConfig, RecoveryConfig};
//!
//! // Build a config directly (use HealingConfig::from_env() in production)
//! let config = HealingConfig {
//!     diagnosis: DiagnosisConfig::default(),
//!     recovery: RecoveryConfig {
//!         max_concurrent_recoveries: 5,
//!         ..RecoveryConfig::default()
//!     },
//!     database_path: None,
//!     log_level: "debug".to_string(),
//! };
//!
//! assert!(self_healing::config::validate_config(&config).is_ok());
//! ```

mod diagnosis;
mod recovery;
mod validation;

pub use diagnosis::{DiagnosisConfig, FusionWeights};
pub use recovery::RecoveryConfig;
pub use validation::{validate_config, MAX_RETRIES, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS};

use std::time::Duration;

use crate::error::ConfigError;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Engine configuration.
///
/// Use [`HealingConfig::from_env`] to load configuration from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct HealingConfig {
    /// Diagnosis engine settings.
    pub diagnosis: DiagnosisConfig,
    /// Recovery engine settings.
    pub recovery: RecoveryConfig,
    /// `SQLite` knowledge store path. `None` keeps the knowledge base in memory.
    pub database_path: Option<String>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: String,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            diagnosis: DiagnosisConfig::default(),
            recovery: RecoveryConfig::default(),
            database_path: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl HealingConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the `HEALING_*` variables documented on [`DiagnosisConfig::from_env`]
    /// and [`RecoveryConfig::from_env`], plus:
    /// - `DATABASE_PATH`: `SQLite` knowledge store (default: in-memory)
    /// - `LOG_LEVEL`: Logging level (default: `info`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable cannot be parsed or a value
    /// fails validation (see [`validate_config`]).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let config = Self {
            diagnosis: DiagnosisConfig::from_env()?,
            recovery: RecoveryConfig::from_env()?,
            database_path: std::env::var("DATABASE_PATH")
                .ok()
                .filter(|path| !path.trim().is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.into()),
        };

        validate_config(&config)?;
        Ok(config)
    }
}

/// Parse an environment variable as u64, using a default if not set.
pub(crate) fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a positive integer".into(),
        })
    })
}

/// Parse an environment variable as u32, using a default if not set.
pub(crate) fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a positive integer".into(),
        })
    })
}

/// Parse an environment variable as usize, using a default if not set.
pub(crate) fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a positive integer".into(),
        })
    })
}

/// Parse an environment variable as f64, using a default if not set.
pub(crate) fn parse_env_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ConfigError::InvalidValue {
                var: name.into(),
                reason: "must be a number".into(),
            })
    })
}

/// Parse an environment variable as bool, using a default if not set.
pub(crate) fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        match val.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var: name.into(),
                reason: "must be true or false".into(),
            }),
        }
    })
}

/// Parse an environment variable holding milliseconds, using a default if not set.
pub(crate) fn parse_env_millis(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_env_u64(name, default_ms).map(Duration::from_millis)
}
