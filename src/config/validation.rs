//! Configuration validation.
//!
//! This module provides validation logic for configuration values,
//! ensuring they are within acceptable ranges.

use std::time::Duration;

use super::HealingConfig;
use crate::error::ConfigError;

/// Minimum allowed timeout in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 10;

/// Maximum allowed timeout in milliseconds (1 hour).
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// Maximum allowed retry count.
pub const MAX_RETRIES: u32 = 10;

/// Maximum allowed concurrent recoveries.
pub const MAX_CONCURRENT_RECOVERIES: u32 = 64;

/// Validate configuration values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range:
/// - timeouts must be between 10 ms and 1 hour
/// - thresholds and fusion weights must lie in `[0, 1]`
/// - `HEALING_MAX_CONCURRENT_RECOVERIES` must be between 1 and 64
/// - `HEALING_MAX_RETRIES` must be between 0 and 10
/// - the log entry bound and the learning interval must be non-zero
pub fn validate_config(config: &HealingConfig) -> Result<(), ConfigError> {
    let diagnosis = &config.diagnosis;
    let recovery = &config.recovery;

    check_timeout("HEALING_ANALYSIS_TIMEOUT_MS", diagnosis.analysis_timeout)?;
    check_timeout("HEALING_RECOVERY_TIMEOUT_MS", recovery.recovery_timeout)?;
    check_timeout("HEALING_ROLLBACK_TIMEOUT_MS", recovery.rollback_timeout)?;

    check_unit("HEALING_CONFIDENCE_THRESHOLD", diagnosis.confidence_threshold)?;
    check_unit(
        "HEALING_PATTERN_MATCH_THRESHOLD",
        diagnosis.pattern_match_threshold,
    )?;
    check_unit("HEALING_SUCCESS_THRESHOLD", recovery.success_threshold)?;
    check_unit("HEALING_ROLLBACK_THRESHOLD", recovery.rollback_threshold)?;

    let fusion = &diagnosis.fusion;
    check_unit("fusion.ml", fusion.ml)?;
    check_unit("fusion.log", fusion.log)?;
    check_unit("fusion.pattern", fusion.pattern)?;
    check_unit("fusion.root_cause", fusion.root_cause)?;
    check_unit("fusion.gate", fusion.gate)?;

    if diagnosis.max_log_entries == 0 {
        return Err(ConfigError::InvalidValue {
            var: "HEALING_MAX_LOG_ENTRIES".into(),
            reason: "must be greater than zero".into(),
        });
    }

    if diagnosis.learning_interval.is_zero() {
        return Err(ConfigError::InvalidValue {
            var: "HEALING_LEARNING_INTERVAL_SECS".into(),
            reason: "must be greater than zero".into(),
        });
    }

    if recovery.max_concurrent_recoveries == 0
        || recovery.max_concurrent_recoveries > MAX_CONCURRENT_RECOVERIES
    {
        return Err(ConfigError::InvalidValue {
            var: "HEALING_MAX_CONCURRENT_RECOVERIES".into(),
            reason: format!("must be between 1 and {MAX_CONCURRENT_RECOVERIES}"),
        });
    }

    if recovery.max_retries > MAX_RETRIES {
        return Err(ConfigError::InvalidValue {
            var: "HEALING_MAX_RETRIES".into(),
            reason: format!("must be between 0 and {MAX_RETRIES}"),
        });
    }

    if recovery.retry_delay > Duration::from_millis(MAX_TIMEOUT_MS) {
        return Err(ConfigError::InvalidValue {
            var: "HEALING_RETRY_DELAY_MS".into(),
            reason: format!("must be at most {MAX_TIMEOUT_MS} ms"),
        });
    }

    Ok(())
}

fn check_timeout(var: &str, value: Duration) -> Result<(), ConfigError> {
    let ms = value.as_millis();
    if ms < u128::from(MIN_TIMEOUT_MS) || ms > u128::from(MAX_TIMEOUT_MS) {
        return Err(ConfigError::InvalidValue {
            var: var.into(),
            reason: format!("must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS} ms"),
        });
    }
    Ok(())
}

fn check_unit(var: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            var: var.into(),
            reason: "must be between 0.0 and 1.0".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&HealingConfig::default()).is_ok());
    }

    #[test]
    fn test_analysis_timeout_too_low() {
        let mut config = HealingConfig::default();
        config.diagnosis.analysis_timeout = Duration::from_millis(1);
        let err = validate_config(&config).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { var, .. } if var == "HEALING_ANALYSIS_TIMEOUT_MS")
        );
    }

    #[test]
    fn test_recovery_timeout_too_high() {
        let mut config = HealingConfig::default();
        config.recovery.recovery_timeout = Duration::from_millis(MAX_TIMEOUT_MS + 1);
        let err = validate_config(&config).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { var, .. } if var == "HEALING_RECOVERY_TIMEOUT_MS")
        );
    }

    #[test_case(-0.1 ; "negative")]
    #[test_case(1.01 ; "above one")]
    #[test_case(f64::NAN ; "nan")]
    fn test_threshold_out_of_range(value: f64) {
        let mut config = HealingConfig::default();
        config.recovery.rollback_threshold = value;
        let err = validate_config(&config).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { var, .. } if var == "HEALING_ROLLBACK_THRESHOLD")
        );
    }

    #[test]
    fn test_fusion_weight_out_of_range() {
        let mut config = HealingConfig::default();
        config.diagnosis.fusion.ml = 2.0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == "fusion.ml"));
    }

    #[test_case(0 ; "zero")]
    #[test_case(65 ; "too many")]
    fn test_concurrency_bounds(value: u32) {
        let mut config = HealingConfig::default();
        config.recovery.max_concurrent_recoveries = value;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_retries_too_high() {
        let mut config = HealingConfig::default();
        config.recovery.max_retries = 11;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == "HEALING_MAX_RETRIES"));
    }

    #[test]
    fn test_zero_log_entry_bound() {
        let mut config = HealingConfig::default();
        config.diagnosis.max_log_entries = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { var, .. } if var == "HEALING_MAX_LOG_ENTRIES")
        );
    }

    #[test]
    fn test_zero_learning_interval() {
        let mut config = HealingConfig::default();
        config.diagnosis.learning_interval = Duration::ZERO;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_boundary_values_accepted() {
        let mut config = HealingConfig::default();
        config.diagnosis.confidence_threshold = 0.0;
        config.recovery.success_threshold = 1.0;
        config.recovery.max_retries = MAX_RETRIES;
        config.recovery.max_concurrent_recoveries = MAX_CONCURRENT_RECOVERIES;
        config.diagnosis.analysis_timeout = Duration::from_millis(MIN_TIMEOUT_MS);
        assert!(validate_config(&config).is_ok());
    }
}
