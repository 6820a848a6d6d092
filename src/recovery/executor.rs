//! Action execution.
//!
//! Steps name an action; the [`ExecutorRegistry`] resolves it to an
//! [`ActionExecutor`] when the step runs. [`run_step`] adds the per-attempt
//! timeout and linear-backoff retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ActionError, RecoveryError};

use super::types::{RecoveryStep, StepResult};

/// Performs recovery actions against the managed system.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Run the step's action and return its output.
    async fn execute(&self, step: &RecoveryStep) -> Result<Value, ActionError>;

    /// Undo a previously applied step.
    async fn compensate(&self, step: &RecoveryStep) -> Result<(), ActionError>;
}

/// Executor that logs and acknowledges every action.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingActionExecutor;

#[async_trait]
impl ActionExecutor for LoggingActionExecutor {
    async fn execute(&self, step: &RecoveryStep) -> Result<Value, ActionError> {
        let parameters = Value::Object(step.parameters.clone());
        info!(
            step_id = %step.id,
            action = %step.action,
            %parameters,
            "Executing recovery action"
        );
        Ok(json!({ "action": step.action, "acknowledged": true }))
    }

    async fn compensate(&self, step: &RecoveryStep) -> Result<(), ActionError> {
        info!(step_id = %step.id, action = %step.action, "Compensating recovery action");
        Ok(())
    }
}

/// Maps action identifiers to executors.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn ActionExecutor>>,
    fallback: Option<Arc<dyn ActionExecutor>>,
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut actions: Vec<&String> = self.executors.keys().collect();
        actions.sort();
        f.debug_struct("ExecutorRegistry")
            .field("actions", &actions)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl ExecutorRegistry {
    /// Create an empty registry. Every action is unsupported.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry whose fallback is [`LoggingActionExecutor`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new().with_fallback(Arc::new(LoggingActionExecutor))
    }

    /// Set the executor for actions with no specific registration.
    #[must_use]
    pub fn with_fallback(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.fallback = Some(executor);
        self
    }

    /// Register an executor for one action.
    pub fn register(&mut self, action: impl Into<String>, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(action.into(), executor);
    }

    /// Resolve an action.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Unsupported`] if nothing handles the action.
    pub fn resolve(&self, action: &str) -> Result<Arc<dyn ActionExecutor>, ActionError> {
        self.executors
            .get(action)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| ActionError::Unsupported {
                action: action.to_string(),
            })
    }
}

/// Retry policy for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff unit; attempt `n` waits `n * retry_delay`.
    pub retry_delay: Duration,
}

/// Run a step with timeouts and retries. Never fails; the outcome is in the result.
///
/// Timeouts and [`ActionError::Transient`] errors are retried; anything
/// else fails the step immediately.
pub async fn run_step(
    executors: &ExecutorRegistry,
    step: &RecoveryStep,
    policy: RetryPolicy,
) -> StepResult {
    let started_at = Utc::now();
    let started = Instant::now();
    let mut attempts = 0;

    let executor = match executors.resolve(&step.action) {
        Ok(executor) => executor,
        Err(e) => {
            warn!(step_id = %step.id, error = %e, "No executor for recovery action");
            return StepResult {
                step_id: step.id.clone(),
                success: false,
                error: Some(e.to_string()),
                duration: started.elapsed(),
                attempts,
                output: None,
                started_at,
            };
        }
    };

    loop {
        attempts += 1;
        let (error, retryable) =
            match tokio::time::timeout(step.timeout, executor.execute(step)).await {
                Ok(Ok(output)) => {
                    debug!(step_id = %step.id, attempts, "Recovery step succeeded");
                    return StepResult {
                        step_id: step.id.clone(),
                        success: true,
                        error: None,
                        duration: started.elapsed(),
                        attempts,
                        output: Some(output),
                        started_at,
                    };
                }
                Ok(Err(e)) => (e.to_string(), e.is_retryable()),
                Err(_) => {
                    let e = RecoveryError::StepTimeout {
                        step: step.name.clone(),
                        timeout_ms: u64::try_from(step.timeout.as_millis()).unwrap_or(u64::MAX),
                    };
                    (e.to_string(), true)
                }
            };

        if !retryable || attempts > policy.max_retries {
            warn!(step_id = %step.id, attempts, error = %error, "Recovery step failed");
            return StepResult {
                step_id: step.id.clone(),
                success: false,
                error: Some(error),
                duration: started.elapsed(),
                attempts,
                output: None,
                started_at,
            };
        }

        debug!(step_id = %step.id, attempts, error = %error, "Retrying recovery step");
        tokio::time::sleep(policy.retry_delay * attempts).await;
    }
}

/// Compensate one applied step, bounded by the step timeout.
pub async fn compensate_step(executors: &ExecutorRegistry, step: &RecoveryStep) -> StepResult {
    let started_at = Utc::now();
    let started = Instant::now();

    let outcome = match executors.resolve(&step.action) {
        Ok(executor) => match tokio::time::timeout(step.timeout, executor.compensate(step)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(RecoveryError::StepTimeout {
                step: step.name.clone(),
                timeout_ms: u64::try_from(step.timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .to_string()),
        },
        Err(e) => Err(e.to_string()),
    };

    if let Err(error) = &outcome {
        warn!(step_id = %step.id, error = %error, "Compensation failed");
    }

    StepResult {
        step_id: step.id.clone(),
        success: outcome.is_ok(),
        error: outcome.err(),
        duration: started.elapsed(),
        attempts: 1,
        output: None,
        started_at,
    }
}
