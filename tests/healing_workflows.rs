//! End-to-end healing workflows.
//!
//! Drives [`SelfHealingSystem`] from incident to finished recovery with
//! scripted action executors.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio::sync::watch;

use self_healing::config::HealingConfig;
use self_healing::error::ActionError;
use self_healing::incident::{metric_keys, Severity, SystemIncident};
use self_healing::knowledge::{KnowledgeBase, KnowledgeStore, Solution};
use self_healing::recovery::{
    actions, ActionExecutor, ExecutorRegistry, OperationStatus, RecoveryStep, StrategyRegistry,
};
use self_healing::{RecoveryDecision, SelfHealingSystem};

// ============================================================================
// Test Utilities
// ============================================================================

/// Default gate, fast retries.
fn config() -> HealingConfig {
    let mut config = HealingConfig::default();
    config.recovery.retry_delay = std::time::Duration::from_millis(1);
    config
}

fn degraded_service(id: &str) -> SystemIncident {
    SystemIncident::new(id, "availability", Severity::High)
        .with_node("node-7")
        .with_metric(metric_keys::ERROR_RATE, 0.15)
        .with_symptom("service restart loop")
        .with_symptom("health check failures")
        .with_symptom("elevated error rate")
}

/// Fails every action.
struct Refusing;

#[async_trait]
impl ActionExecutor for Refusing {
    async fn execute(&self, step: &RecoveryStep) -> Result<Value, ActionError> {
        Err(ActionError::Failed {
            action: step.action.clone(),
            message: "refused".into(),
        })
    }

    async fn compensate(&self, _step: &RecoveryStep) -> Result<(), ActionError> {
        Ok(())
    }
}

/// Blocks every action until the gate opens.
struct Gated(watch::Receiver<bool>);

#[async_trait]
impl ActionExecutor for Gated {
    async fn execute(&self, _step: &RecoveryStep) -> Result<Value, ActionError> {
        let mut gate = self.0.clone();
        let _ = gate.wait_for(|open| *open).await;
        Ok(Value::Null)
    }

    async fn compensate(&self, _step: &RecoveryStep) -> Result<(), ActionError> {
        Ok(())
    }
}

fn system_with(executors: ExecutorRegistry) -> SelfHealingSystem {
    SelfHealingSystem::with_components(
        config(),
        Arc::new(KnowledgeBase::new()),
        StrategyRegistry::with_defaults(),
        executors,
    )
}

// ============================================================================
// Workflows
// ============================================================================

#[tokio::test]
async fn test_service_degradation_is_restarted() {
    let system = system_with(ExecutorRegistry::with_defaults());
    let incident = degraded_service("inc-svc");

    let outcome = system.handle_incident(&incident).await.unwrap();
    assert_eq!(outcome.diagnosis.root_cause, "service_degradation");
    let operation = outcome.operation().expect("recovery should start");
    assert_eq!(operation.strategy_name, "service_restart");
    assert_eq!(operation.status, OperationStatus::Scheduled);

    let done = system
        .recovery_engine()
        .wait_for_completion(&operation.id)
        .await
        .unwrap();
    assert_eq!(done.status, OperationStatus::Completed);
    assert_eq!(done.step_results.len(), 3);
    assert!((done.progress - 1.0).abs() < f64::EPSILON);

    let history = system.recovery_engine().recovery_history();
    assert_eq!(history.len(), 1);
    assert!(history[0].success);

    let solution = system
        .knowledge()
        .solution(&Solution::id_for("service_degradation", "service_restart"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(solution.success_rate.samples, 1);
    assert_eq!(system.diagnosis_engine().diagnostic_history().len(), 1);
    assert_eq!(system.knowledge().incidents().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_successful_recovery_trains_classifier() {
    let system = system_with(ExecutorRegistry::with_defaults());
    let outcome = system
        .handle_incident(&degraded_service("inc-train"))
        .await
        .unwrap();
    let id = outcome.operation().unwrap().id.clone();
    system.recovery_engine().wait_for_completion(&id).await.unwrap();

    let classifier = system.diagnosis_engine().classifier();
    assert_eq!(classifier.corpus_len().unwrap(), 1);

    let report = system.diagnosis_engine().learn_cycle().await.unwrap();
    assert_eq!(report.examples_added, 0);
    assert_eq!(classifier.snapshot().unwrap().version, 1);
}

#[tokio::test]
async fn test_failed_critical_step_rolls_back() {
    let mut executors = ExecutorRegistry::with_defaults();
    executors.register(actions::START_SERVICE, Arc::new(Refusing));
    let system = system_with(executors);

    let outcome = system
        .handle_incident(&degraded_service("inc-rollback"))
        .await
        .unwrap();
    let id = outcome.operation().unwrap().id.clone();
    let done = system.recovery_engine().wait_for_completion(&id).await.unwrap();

    // stop succeeded, start failed and aborted the plan: 1 of 2 failed.
    assert_eq!(done.step_results.len(), 2);
    assert_eq!(done.status, OperationStatus::RolledBack);
    assert_eq!(done.rollback_results.len(), 1);
    assert_eq!(done.rollback_results[0].step_id, "stop");

    let stats = system.recovery_engine().strategy_stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].rollbacks, 1);
    assert_eq!(stats[0].successes, 0);

    // Failed recoveries never become training data.
    assert_eq!(system.diagnosis_engine().classifier().corpus_len().unwrap(), 0);
}

#[tokio::test]
async fn test_repeated_incident_joins_running_recovery() {
    let (open, gate) = watch::channel(false);
    let system = system_with(ExecutorRegistry::new().with_fallback(Arc::new(Gated(gate))));
    let incident = degraded_service("inc-dup");

    let first = system.handle_incident(&incident).await.unwrap();
    let second = system.handle_incident(&incident).await.unwrap();
    let first_id = first.operation().unwrap().id.clone();
    assert_eq!(first_id, second.operation().unwrap().id);

    open.send_replace(true);
    let done = system
        .recovery_engine()
        .wait_for_completion(&first_id)
        .await
        .unwrap();
    assert_eq!(done.status, OperationStatus::Completed);
    assert_eq!(system.recovery_engine().recovery_history().len(), 1);
}

#[tokio::test]
async fn test_slow_recovery_does_not_hold_up_other_incidents() {
    let (open, gate) = watch::channel(false);
    let mut executors = ExecutorRegistry::with_defaults();
    executors.register(actions::STOP_SERVICE, Arc::new(Gated(gate)));
    let system = Arc::new(system_with(executors));

    let slow = {
        let system = Arc::clone(&system);
        tokio::spawn(async move {
            let outcome = system
                .handle_incident(&degraded_service("inc-slow"))
                .await
                .unwrap();
            let id = outcome.operation().unwrap().id.clone();
            system.recovery_engine().wait_for_completion(&id).await.unwrap()
        })
    };

    let hot = SystemIncident::new("inc-hot", "performance", Severity::High)
        .with_metric(metric_keys::CPU_UTILIZATION, 0.95);
    let outcome = system.handle_incident(&hot).await.unwrap();
    let id = outcome.operation().unwrap().id.clone();
    let done = system.recovery_engine().wait_for_completion(&id).await.unwrap();
    assert_eq!(done.status, OperationStatus::Completed);
    assert!(!slow.is_finished());

    open.send_replace(true);
    let slow_done = slow.await.unwrap();
    assert_eq!(slow_done.status, OperationStatus::Completed);
    assert_eq!(system.recovery_engine().recovery_history().len(), 2);
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_recovery() {
    let (_open, gate) = watch::channel(false);
    let system = system_with(ExecutorRegistry::new().with_fallback(Arc::new(Gated(gate))));
    let handle = system.start();

    let outcome = system
        .handle_incident(&degraded_service("inc-stop"))
        .await
        .unwrap();
    let id = outcome.operation().unwrap().id.clone();

    handle.shutdown().await;
    let done = system.recovery_engine().wait_for_completion(&id).await.unwrap();
    assert_eq!(done.status, OperationStatus::Cancelled);
    assert!(done.ended_at.is_some());
}

#[tokio::test]
async fn test_quiet_incident_is_not_recovered() {
    let system = SelfHealingSystem::new(HealingConfig::default(), Arc::new(KnowledgeBase::new()));
    let incident = SystemIncident::new("inc-quiet", "performance", Severity::Low);

    let outcome = system.handle_incident(&incident).await.unwrap();
    assert_eq!(outcome.diagnosis.root_cause, "unknown");
    assert!(matches!(
        outcome.decision,
        RecoveryDecision::BelowConfidence { .. }
    ));
    assert!(system.recovery_engine().recovery_history().is_empty());
}

#[tokio::test]
async fn test_incident_json_round_trip_through_system() {
    let json = r#"{
        "id": "inc-json",
        "type": "performance",
        "severity": "critical",
        "metrics": { "cpu_utilization": 0.97 }
    }"#;
    let incident: SystemIncident = serde_json::from_str(json).unwrap();
    let system = system_with(ExecutorRegistry::with_defaults());

    let outcome = system.handle_incident(&incident).await.unwrap();
    assert_eq!(outcome.diagnosis.root_cause, "cpu_exhaustion");
    assert_eq!(
        outcome.diagnosis.recommended_actions[0],
        "Escalate to on-call engineer"
    );
    assert_eq!(outcome.operation().unwrap().strategy_name, "resource_scaling");

    let line = serde_json::to_value(&outcome).unwrap();
    assert_eq!(line["decision"], "started");
    assert_eq!(line["operation"]["strategy_name"], "resource_scaling");
}
