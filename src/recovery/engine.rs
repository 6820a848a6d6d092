//! Recovery engine.
//!
//! Selects a strategy for a diagnosis, schedules the plan as a
//! [`RecoveryOperation`], and executes it on a background task under a
//! concurrency limit. Finished operations feed the strategy statistics,
//! the knowledge base, and (optionally) a [`RecoveryFeedback`] sink.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::RecoveryConfig;
use crate::diagnosis::DiagnosticResult;
use crate::error::RecoveryError;
use crate::incident::SystemIncident;
use crate::knowledge::KnowledgeStore;
use crate::signal::either_cancelled;

use super::executor::{compensate_step, run_step, ExecutorRegistry, RetryPolicy};
use super::learner::{StrategyLearner, StrategyStats};
use super::rollback::{compensation_order, should_rollback};
use super::strategy::StrategyRegistry;
use super::types::{
    recovery_rate, OperationStatus, RecoveryOperation, RecoveryPlan, RecoveryResult,
};

/// Number of recovery results kept in memory.
pub const RECOVERY_HISTORY_LIMIT: usize = 100;

/// Finished operations kept for status queries.
pub const OPERATION_RETENTION: usize = 1000;

/// Receives finished recoveries, e.g. to train the diagnosis engine.
pub trait RecoveryFeedback: Send + Sync {
    /// Called once per finished operation.
    fn record_recovery(
        &self,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
        result: &RecoveryResult,
    );
}

struct OperationEntry {
    state: Arc<Mutex<RecoveryOperation>>,
    done: watch::Receiver<bool>,
}

#[derive(Default)]
struct OperationTable {
    entries: HashMap<String, OperationEntry>,
    by_incident: HashMap<String, String>,
}

impl OperationTable {
    fn unfinished_for(&self, incident_id: &str) -> Option<RecoveryOperation> {
        let id = self.by_incident.get(incident_id)?;
        let snapshot = lock(&self.entries.get(id)?.state).clone();
        (!snapshot.is_finished()).then_some(snapshot)
    }

    /// Drop the oldest finished operations beyond the retention limit.
    fn prune(&mut self) {
        if self.entries.len() <= OPERATION_RETENTION {
            return;
        }
        let mut finished: Vec<(chrono::DateTime<Utc>, String)> = self
            .entries
            .iter()
            .filter_map(|(id, entry)| lock(&entry.state).ended_at.map(|at| (at, id.clone())))
            .collect();
        finished.sort();
        let excess = self.entries.len() - OPERATION_RETENTION;
        for (_, id) in finished.into_iter().take(excess) {
            self.entries.remove(&id);
            self.by_incident.retain(|_, op| *op != id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_status(state: &Mutex<RecoveryOperation>, next: OperationStatus) {
    let mut op = lock(state);
    if let Err(e) = op.transition(next) {
        warn!(operation_id = %op.id, error = %e, "Ignoring status change");
    }
}

fn fail(state: &Mutex<RecoveryOperation>, message: String) {
    let mut op = lock(state);
    if let Err(e) = op.transition(OperationStatus::Failed) {
        warn!(operation_id = %op.id, error = %e, "Ignoring status change");
    }
    op.error.get_or_insert(message);
}

enum Execution {
    Finished { abort: Option<String> },
    TimedOut,
    Cancelled,
}

/// Recovery engine.
pub struct RecoveryEngine {
    config: RecoveryConfig,
    strategies: StrategyRegistry,
    executors: ExecutorRegistry,
    knowledge: Arc<dyn KnowledgeStore>,
    feedback: Option<Arc<dyn RecoveryFeedback>>,
    permits: Arc<Semaphore>,
    operations: Mutex<OperationTable>,
    history: Mutex<VecDeque<RecoveryResult>>,
    learner: StrategyLearner,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for RecoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryEngine")
            .field("config", &self.config)
            .field("strategies", &self.strategies)
            .field("executors", &self.executors)
            .finish_non_exhaustive()
    }
}

impl RecoveryEngine {
    /// Create a new engine.
    #[must_use]
    pub fn new(
        config: RecoveryConfig,
        strategies: StrategyRegistry,
        executors: ExecutorRegistry,
        knowledge: Arc<dyn KnowledgeStore>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_recoveries as usize));
        Self {
            config,
            strategies,
            executors,
            knowledge,
            feedback: None,
            permits,
            operations: Mutex::new(OperationTable::default()),
            history: Mutex::new(VecDeque::with_capacity(RECOVERY_HISTORY_LIMIT)),
            learner: StrategyLearner::new(),
            shutdown: watch::channel(false).0,
        }
    }

    /// Create an engine with the built-in strategies and the logging executor.
    #[must_use]
    pub fn with_defaults(config: RecoveryConfig, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        Self::new(
            config,
            StrategyRegistry::with_defaults(),
            ExecutorRegistry::with_defaults(),
            knowledge,
        )
    }

    /// Send finished recoveries to `feedback` when learning is enabled.
    #[must_use]
    pub fn with_feedback(mut self, feedback: Arc<dyn RecoveryFeedback>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// The strategy registry.
    #[must_use]
    pub const fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Start recovering from a diagnosed incident.
    ///
    /// Returns the scheduled operation. If an unfinished operation already
    /// exists for the incident, that operation is returned instead.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::NoApplicableStrategy`] if no strategy handles
    /// the root cause and [`RecoveryError::PlanCreation`] if the strategy
    /// cannot build a plan.
    pub fn recover_from_incident(
        self: &Arc<Self>,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
    ) -> Result<RecoveryOperation, RecoveryError> {
        self.recover_with_cancel(incident, diagnosis, watch::channel(false).1)
    }

    /// Like [`Self::recover_from_incident`], abandoning the operation when
    /// `cancel` becomes `true`.
    ///
    /// # Errors
    ///
    /// See [`Self::recover_from_incident`].
    pub fn recover_with_cancel(
        self: &Arc<Self>,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
        cancel: watch::Receiver<bool>,
    ) -> Result<RecoveryOperation, RecoveryError> {
        let (state, plan, done_tx, snapshot) = {
            let mut table = lock(&self.operations);
            if let Some(existing) = table.unfinished_for(&incident.id) {
                debug!(
                    incident_id = %incident.id,
                    operation_id = %existing.id,
                    "Recovery already in progress"
                );
                return Ok(existing);
            }

            let strategy = self.strategies.select(incident, diagnosis)?;
            let plan = strategy.create_plan(incident, diagnosis)?;
            let operation = RecoveryOperation::new(&plan, &diagnosis.root_cause);
            let snapshot = operation.clone();
            let state = Arc::new(Mutex::new(operation));
            let (done_tx, done_rx) = watch::channel(false);

            table.entries.insert(
                snapshot.id.clone(),
                OperationEntry {
                    state: Arc::clone(&state),
                    done: done_rx,
                },
            );
            table
                .by_incident
                .insert(incident.id.clone(), snapshot.id.clone());
            table.prune();
            (state, plan, done_tx, snapshot)
        };

        info!(
            incident_id = %incident.id,
            operation_id = %snapshot.id,
            strategy = %plan.strategy_name,
            root_cause = %diagnosis.root_cause,
            steps = plan.steps.len(),
            risk = %plan.risk_level,
            "Recovery scheduled"
        );

        let engine = Arc::clone(self);
        let incident = incident.clone();
        let diagnosis = diagnosis.clone();
        tokio::spawn(async move {
            engine
                .run_operation(state, plan, &incident, &diagnosis, cancel)
                .await;
            let _ = done_tx.send(true);
        });

        Ok(snapshot)
    }

    /// Snapshot of an operation.
    #[must_use]
    pub fn operation_status(&self, operation_id: &str) -> Option<RecoveryOperation> {
        let table = lock(&self.operations);
        table
            .entries
            .get(operation_id)
            .map(|entry| lock(&entry.state).clone())
    }

    /// Wait until the engine is done with an operation and return its final state.
    pub async fn wait_for_completion(&self, operation_id: &str) -> Option<RecoveryOperation> {
        let mut done = {
            let table = lock(&self.operations);
            table.entries.get(operation_id)?.done.clone()
        };
        // A dropped sender means the task is gone; report what it left behind.
        let _ = done.wait_for(|finished| *finished).await;
        self.operation_status(operation_id)
    }

    /// Recent recovery results, oldest first.
    #[must_use]
    pub fn recovery_history(&self) -> Vec<RecoveryResult> {
        lock(&self.history).iter().cloned().collect()
    }

    /// Per-strategy statistics.
    #[must_use]
    pub fn strategy_stats(&self) -> Vec<StrategyStats> {
        self.learner.all()
    }

    /// Cancel every in-flight operation.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    async fn run_operation(
        &self,
        state: Arc<Mutex<RecoveryOperation>>,
        plan: RecoveryPlan,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
        mut cancel: watch::Receiver<bool>,
    ) {
        let started = Instant::now();
        let mut shutdown = self.shutdown.subscribe();

        let permit = tokio::select! {
            biased;
            () = either_cancelled(&mut cancel, &mut shutdown) => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        };

        let Some(_permit) = permit else {
            set_status(&state, OperationStatus::Cancelled);
            self.finish(&state, incident, diagnosis, started).await;
            return;
        };

        set_status(&state, OperationStatus::InProgress);

        let execution = tokio::select! {
            biased;
            () = either_cancelled(&mut cancel, &mut shutdown) => Execution::Cancelled,
            finished = tokio::time::timeout(
                self.config.recovery_timeout,
                self.execute_steps(&state, &plan),
            ) => match finished {
                Ok(abort) => Execution::Finished { abort },
                Err(_) => Execution::TimedOut,
            },
        };

        match execution {
            Execution::Cancelled => {
                warn!(incident_id = %incident.id, "Recovery cancelled");
                set_status(&state, OperationStatus::Cancelled);
            }
            Execution::TimedOut => {
                let message = format!(
                    "Recovery timed out after {}ms",
                    self.config.recovery_timeout.as_millis()
                );
                fail(&state, message);
            }
            Execution::Finished { abort: Some(message) } => fail(&state, message),
            Execution::Finished { abort: None } => {
                let rate = {
                    let op = lock(&state);
                    recovery_rate(op.steps_completed(), op.steps_failed())
                };
                if rate >= self.config.success_threshold {
                    set_status(&state, OperationStatus::Completed);
                } else {
                    fail(
                        &state,
                        format!(
                            "Recovery rate {rate:.2} below success threshold {:.2}",
                            self.config.success_threshold
                        ),
                    );
                }
            }
        }

        let needs_rollback = {
            let op = lock(&state);
            op.status == OperationStatus::Failed
                && self.config.enable_rollback
                && should_rollback(&op, self.config.rollback_threshold)
        };
        if needs_rollback {
            self.roll_back(&state, &plan).await;
        }

        self.finish(&state, incident, diagnosis, started).await;
    }

    /// Run steps in order. Returns the abort message of a failed critical step.
    async fn execute_steps(
        &self,
        state: &Mutex<RecoveryOperation>,
        plan: &RecoveryPlan,
    ) -> Option<String> {
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            retry_delay: self.config.retry_delay,
        };
        let total = plan.steps.len();

        for (index, step) in plan.steps.iter().enumerate() {
            let result = run_step(&self.executors, step, policy).await;
            let failed_critical = !result.success && step.critical;
            let step_error = result.error.clone().unwrap_or_default();
            {
                let mut op = lock(state);
                op.step_results.push(result);
                #[allow(clippy::cast_precision_loss)]
                let progress = (index + 1) as f64 / total as f64;
                op.progress = progress;
            }
            if failed_critical {
                let e = RecoveryError::ExecutionAborted {
                    step: step.name.clone(),
                    message: step_error,
                };
                warn!(plan_id = %plan.id, step_id = %step.id, error = %e, "Critical step failed");
                return Some(e.to_string());
            }
        }

        if total == 0 {
            lock(state).progress = 1.0;
        }
        None
    }

    async fn roll_back(&self, state: &Mutex<RecoveryOperation>, plan: &RecoveryPlan) {
        let (operation_id, steps) = {
            let op = lock(state);
            (op.id.clone(), compensation_order(plan, &op))
        };
        set_status(state, OperationStatus::RollingBack);
        info!(operation_id = %operation_id, steps = steps.len(), "Rolling back recovery");

        let compensation = async {
            let mut failures = Vec::new();
            for step in steps {
                let result = compensate_step(&self.executors, step).await;
                if let Some(e) = &result.error {
                    failures.push(format!("{}: {e}", step.id));
                }
                lock(state).rollback_results.push(result);
            }
            failures
        };

        let failures = match tokio::time::timeout(self.config.rollback_timeout, compensation).await {
            Ok(failures) => failures,
            Err(_) => vec![format!(
                "timed out after {}ms",
                self.config.rollback_timeout.as_millis()
            )],
        };

        if failures.is_empty() {
            set_status(state, OperationStatus::RolledBack);
        } else {
            let e = RecoveryError::RollbackFailed {
                operation_id,
                message: failures.join("; "),
            };
            error!(error = %e, "Rollback failed, operator action required");
            let mut op = lock(state);
            if let Err(transition) = op.transition(OperationStatus::Failed) {
                warn!(error = %transition, "Ignoring status change");
            }
            op.error = Some(e.to_string());
        }
    }

    async fn finish(
        &self,
        state: &Mutex<RecoveryOperation>,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
        started: Instant,
    ) {
        let result = {
            let mut op = lock(state);
            op.ended_at = Some(Utc::now());
            RecoveryResult::from_operation(&op, started.elapsed())
        };

        info!(
            operation_id = %result.operation_id,
            incident_id = %result.incident_id,
            strategy = %result.strategy_name,
            success = result.success,
            recovery_rate = result.recovery_rate,
            rollback = result.rollback_performed,
            "Recovery finished"
        );

        {
            let mut history = lock(&self.history);
            if history.len() >= RECOVERY_HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(result.clone());
        }
        self.learner.record(&result);

        if let Err(e) = self.knowledge.update_from_recovery(&result).await {
            warn!(operation_id = %result.operation_id, error = %e, "Failed to record recovery");
        }
        if self.config.enable_learning {
            if let Some(feedback) = &self.feedback {
                feedback.record_recovery(incident, diagnosis, &result);
            }
        }
    }
}
