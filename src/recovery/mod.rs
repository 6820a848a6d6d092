//! Incident recovery.
//!
//! A [`RecoveryStrategy`] turns a diagnosis into a [`RecoveryPlan`] of
//! ordered steps. The [`RecoveryEngine`] runs plans as
//! [`RecoveryOperation`]s: each step goes through an [`ActionExecutor`]
//! with retries, a failing critical step aborts the plan, and a mostly
//! failed operation is rolled back by compensating the steps it applied.

mod engine;
mod executor;
mod learner;
mod rollback;
mod strategies;
mod strategy;
mod types;

pub use engine::{RecoveryEngine, RecoveryFeedback, OPERATION_RETENTION, RECOVERY_HISTORY_LIMIT};
pub use executor::{
    compensate_step, run_step, ActionExecutor, ExecutorRegistry, LoggingActionExecutor,
    RetryPolicy,
};
pub use learner::{StrategyLearner, StrategyStats};
pub use rollback::{compensation_order, should_rollback};
pub use strategies::{
    actions, CacheClearingStrategy, ConfigResetStrategy, NetworkRecoveryStrategy,
    ResourceScalingStrategy, ServiceRestartStrategy,
};
pub use strategy::{RecoveryStrategy, StrategyRegistry};
pub use types::{
    recovery_rate, OperationStatus, RecoveryOperation, RecoveryPlan, RecoveryResult,
    RecoveryStep, RiskLevel, StepResult,
};

