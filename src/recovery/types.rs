//! Recovery data model.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RecoveryError;
use crate::incident::duration_millis;

/// Risk of applying a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Safe to apply unattended.
    #[default]
    Low,
    /// May briefly affect traffic.
    Medium,
    /// May disrupt the node.
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a recovery operation.
///
/// ```text
/// scheduled -> in_progress -> completed | failed | cancelled
/// scheduled -> cancelled
/// failed -> rolling_back -> rolled_back | failed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting for an execution slot.
    #[default]
    Scheduled,
    /// Steps are running.
    InProgress,
    /// Recovery succeeded.
    Completed,
    /// Recovery (or its rollback) failed.
    Failed,
    /// Abandoned by the caller or shutdown.
    Cancelled,
    /// Compensating applied steps.
    RollingBack,
    /// Compensation finished.
    RolledBack,
}

impl OperationStatus {
    /// True if the state machine allows moving to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::InProgress | Self::Cancelled)
                | (
                    Self::InProgress,
                    Self::Completed | Self::Failed | Self::Cancelled
                )
                | (Self::Failed, Self::RollingBack)
                | (Self::RollingBack, Self::RolledBack | Self::Failed)
        )
    }

    /// True for states no step will run from.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::RolledBack
        )
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::RollingBack => "rolling_back",
            Self::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// One step of a recovery plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStep {
    /// Step ID, unique within the plan.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the step does.
    pub description: String,
    /// Action identifier resolved by the executor registry.
    pub action: String,
    /// Action parameters.
    pub parameters: Map<String, Value>,
    /// Per-attempt timeout.
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Failure aborts the remaining steps.
    pub critical: bool,
    /// The action can be compensated.
    pub reversible: bool,
    /// Execution order.
    pub order: usize,
}

impl RecoveryStep {
    /// Create a step. Steps default to critical and reversible.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        action: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            action: action.into(),
            parameters: Map::new(),
            timeout,
            critical: true,
            reversible: true,
            order: 0,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Set criticality.
    #[must_use]
    pub const fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Set reversibility.
    #[must_use]
    pub const fn reversible(mut self, reversible: bool) -> Self {
        self.reversible = reversible;
        self
    }
}

/// An ordered, immutable recovery plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPlan {
    /// Plan ID.
    pub id: String,
    /// Strategy that built the plan.
    pub strategy_name: String,
    /// Incident being recovered.
    pub incident_id: String,
    /// Steps, sorted by `order`.
    pub steps: Vec<RecoveryStep>,
    /// Expected wall time.
    #[serde(with = "duration_millis")]
    pub estimated_duration: Duration,
    /// Estimated probability of success.
    pub success_probability: f64,
    /// Risk level.
    pub risk_level: RiskLevel,
    /// Checks expected to pass before execution.
    pub prerequisites: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl RecoveryPlan {
    /// Create a plan. Steps are renumbered in the given order.
    #[must_use]
    pub fn new(
        strategy_name: impl Into<String>,
        incident_id: impl Into<String>,
        steps: Vec<RecoveryStep>,
    ) -> Self {
        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(order, step)| RecoveryStep { order, ..step })
            .collect();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            strategy_name: strategy_name.into(),
            incident_id: incident_id.into(),
            steps,
            estimated_duration: Duration::ZERO,
            success_probability: 0.0,
            risk_level: RiskLevel::Low,
            prerequisites: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Outcome of one executed (or compensated) step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step ID.
    pub step_id: String,
    /// Step succeeded.
    pub success: bool,
    /// Error of the last attempt.
    pub error: Option<String>,
    /// Wall time over all attempts.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// Attempts made.
    pub attempts: u32,
    /// Executor output.
    pub output: Option<Value>,
    /// Start of the first attempt.
    pub started_at: DateTime<Utc>,
}

/// A running or finished execution of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOperation {
    /// Operation ID.
    pub id: String,
    /// Plan being executed.
    pub plan_id: String,
    /// Incident being recovered.
    pub incident_id: String,
    /// Diagnosed root cause.
    pub root_cause: String,
    /// Strategy name.
    pub strategy_name: String,
    /// Current status.
    pub status: OperationStatus,
    /// Attempted steps / total steps.
    pub progress: f64,
    /// Step results, in execution order.
    pub step_results: Vec<StepResult>,
    /// Compensation results, in compensation order.
    pub rollback_results: Vec<StepResult>,
    /// First error that decided the outcome.
    pub error: Option<String>,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Set once the engine is done with the operation.
    pub ended_at: Option<DateTime<Utc>>,
}

impl RecoveryOperation {
    /// Create a scheduled operation for a plan.
    #[must_use]
    pub fn new(plan: &RecoveryPlan, root_cause: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan.id.clone(),
            incident_id: plan.incident_id.clone(),
            root_cause: root_cause.into(),
            strategy_name: plan.strategy_name.clone(),
            status: OperationStatus::Scheduled,
            progress: 0.0,
            step_results: Vec::new(),
            rollback_results: Vec::new(),
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::InvalidTransition`] if the state machine
    /// forbids the move; the status is left unchanged.
    pub fn transition(&mut self, next: OperationStatus) -> Result<(), RecoveryError> {
        if !self.status.can_transition_to(next) {
            return Err(RecoveryError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// True once the engine has released the operation.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Successful step results.
    #[must_use]
    pub fn steps_completed(&self) -> usize {
        self.step_results.iter().filter(|r| r.success).count()
    }

    /// Failed step results.
    #[must_use]
    pub fn steps_failed(&self) -> usize {
        self.step_results.iter().filter(|r| !r.success).count()
    }
}

/// Completed / (completed + failed), or 0 when nothing ran.
#[must_use]
pub fn recovery_rate(completed: usize, failed: usize) -> f64 {
    let total = completed + failed;
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let rate = completed as f64 / total as f64;
    rate
}

/// Final, write-once record of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    /// Operation ID.
    pub operation_id: String,
    /// Incident ID.
    pub incident_id: String,
    /// Diagnosed root cause.
    pub root_cause: String,
    /// Strategy name.
    pub strategy_name: String,
    /// Operation ended `completed`.
    pub success: bool,
    /// Successful steps.
    pub steps_completed: usize,
    /// Failed steps.
    pub steps_failed: usize,
    /// See [`recovery_rate`].
    pub recovery_rate: f64,
    /// Compensation ran.
    pub rollback_performed: bool,
    /// Total wall time.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// Finish time.
    pub timestamp: DateTime<Utc>,
}

impl RecoveryResult {
    /// Summarize a finished operation.
    #[must_use]
    pub fn from_operation(operation: &RecoveryOperation, duration: Duration) -> Self {
        let steps_completed = operation.steps_completed();
        let steps_failed = operation.steps_failed();
        Self {
            operation_id: operation.id.clone(),
            incident_id: operation.incident_id.clone(),
            root_cause: operation.root_cause.clone(),
            strategy_name: operation.strategy_name.clone(),
            success: operation.status == OperationStatus::Completed,
            steps_completed,
            steps_failed,
            recovery_rate: recovery_rate(steps_completed, steps_failed),
            rollback_performed: !operation.rollback_results.is_empty(),
            duration,
            timestamp: operation.ended_at.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(OperationStatus::Scheduled, OperationStatus::InProgress, true)]
    #[test_case(OperationStatus::Scheduled, OperationStatus::Cancelled, true)]
    #[test_case(OperationStatus::Scheduled, OperationStatus::Completed, false)]
    #[test_case(OperationStatus::InProgress, OperationStatus::Completed, true)]
    #[test_case(OperationStatus::InProgress, OperationStatus::Failed, true)]
    #[test_case(OperationStatus::InProgress, OperationStatus::RollingBack, false)]
    #[test_case(OperationStatus::Failed, OperationStatus::RollingBack, true)]
    #[test_case(OperationStatus::Failed, OperationStatus::InProgress, false)]
    #[test_case(OperationStatus::RollingBack, OperationStatus::RolledBack, true)]
    #[test_case(OperationStatus::RollingBack, OperationStatus::Failed, true)]
    #[test_case(OperationStatus::Completed, OperationStatus::Failed, false)]
    #[test_case(OperationStatus::RolledBack, OperationStatus::RollingBack, false)]
    fn test_transitions(from: OperationStatus, to: OperationStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_invalid_transition_leaves_status() {
        let plan = RecoveryPlan::new("service_restart", "inc-1", Vec::new());
        let mut op = RecoveryOperation::new(&plan, "service_degradation");
        let err = op.transition(OperationStatus::Completed).unwrap_err();
        assert_eq!(
            err,
            RecoveryError::InvalidTransition {
                from: "scheduled".into(),
                to: "completed".into(),
            }
        );
        assert_eq!(op.status, OperationStatus::Scheduled);
    }

    #[test_case(0, 0, 0.0)]
    #[test_case(3, 0, 1.0)]
    #[test_case(1, 1, 0.5)]
    #[test_case(1, 3, 0.25)]
    fn test_recovery_rate(completed: usize, failed: usize, expected: f64) {
        assert_eq!(recovery_rate(completed, failed), expected);
    }

    #[test]
    fn test_plan_renumbers_steps() {
        let step = |id: &str| RecoveryStep::new(id, id, "noop", Duration::from_secs(1));
        let plan = RecoveryPlan::new("s", "inc", vec![step("a"), step("b"), step("c")]);
        let orders: Vec<usize> = plan.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&OperationStatus::RollingBack).unwrap();
        assert_eq!(json, "\"rolling_back\"");
        assert_eq!(OperationStatus::InProgress.to_string(), "in_progress");
    }
}
