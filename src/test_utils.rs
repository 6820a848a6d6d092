//! Test fixtures shared by the unit tests.
//!
//! Only compiled for tests (`#[cfg(test)]`).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use chrono::Utc;

use crate::diagnosis::DiagnosticResult;
use crate::incident::{metric_keys, Severity, SystemIncident};
use crate::recovery::{recovery_rate, RecoveryResult};

/// Create a high-severity incident with moderate CPU load.
#[must_use]
pub fn create_test_incident(id: &str) -> SystemIncident {
    SystemIncident::new(id, "performance", Severity::High)
        .with_description("Test incident")
        .with_node("node-1")
        .with_metric(metric_keys::CPU_UTILIZATION, 0.7)
        .with_metric(metric_keys::ERROR_RATE, 0.02)
}

/// Create a diagnosis with a fixed root cause and confidence.
///
/// The duration has millisecond precision so it survives storage.
#[must_use]
pub fn create_test_diagnosis(incident_id: &str, root_cause: &str, confidence: f64) -> DiagnosticResult {
    DiagnosticResult {
        evidence: vec![format!("Test evidence for {root_cause}")],
        recommended_actions: vec!["Restart affected service".to_string()],
        duration: Duration::from_millis(42),
        ..DiagnosticResult::new(incident_id, root_cause, confidence)
    }
}

/// Create a finished recovery result.
///
/// Succeeds when at least one step completed and none failed.
#[must_use]
pub fn create_test_recovery_result(
    root_cause: &str,
    strategy: &str,
    completed: usize,
    failed: usize,
) -> RecoveryResult {
    RecoveryResult {
        operation_id: uuid::Uuid::new_v4().to_string(),
        incident_id: "inc-test".to_string(),
        root_cause: root_cause.to_string(),
        strategy_name: strategy.to_string(),
        success: completed > 0 && failed == 0,
        steps_completed: completed,
        steps_failed: failed,
        recovery_rate: recovery_rate(completed, failed),
        rollback_performed: false,
        duration: Duration::from_millis(1500),
        timestamp: Utc::now(),
    }
}
