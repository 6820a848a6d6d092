//! Rollback decision and compensation order.

use super::types::{RecoveryOperation, RecoveryPlan, RecoveryStep};

/// True when the failed share of recorded step results reaches `threshold`.
#[must_use]
pub fn should_rollback(operation: &RecoveryOperation, threshold: f64) -> bool {
    let recorded = operation.step_results.len();
    if recorded == 0 {
        return false;
    }
    #[allow(clippy::cast_precision_loss)]
    let failed_ratio = operation.steps_failed() as f64 / recorded as f64;
    failed_ratio >= threshold
}

/// Steps to compensate: applied and reversible, most recent first.
#[must_use]
pub fn compensation_order<'a>(
    plan: &'a RecoveryPlan,
    operation: &RecoveryOperation,
) -> Vec<&'a RecoveryStep> {
    operation
        .step_results
        .iter()
        .rev()
        .filter(|result| result.success)
        .filter_map(|result| plan.steps.iter().find(|s| s.id == result.step_id))
        .filter(|step| step.reversible)
        .collect()
}
