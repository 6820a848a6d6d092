//! Built-in recovery strategies.

use std::time::Duration;

use crate::diagnosis::DiagnosticResult;
use crate::error::RecoveryError;
use crate::incident::SystemIncident;

use super::strategy::RecoveryStrategy;
use super::types::{RecoveryPlan, RecoveryStep, RiskLevel};

/// Action identifiers used by the built-in plans.
pub mod actions {
    /// Stop a service.
    pub const STOP_SERVICE: &str = "stop_service";
    /// Start a service.
    pub const START_SERVICE: &str = "start_service";
    /// Scale resources of a node.
    pub const SCALE_RESOURCES: &str = "scale_resources";
    /// Reset configuration to a known good version.
    pub const RESET_CONFIG: &str = "reset_config";
    /// Clear caches.
    pub const CLEAR_CACHE: &str = "clear_cache";
    /// Reset network connections.
    pub const RESET_NETWORK: &str = "reset_network";
    /// Probe node health.
    pub const VERIFY_HEALTH: &str = "verify_health";
}

const DEFAULT_SERVICE: &str = "inference-service";

fn plan(
    strategy: &dyn RecoveryStrategy,
    incident: &SystemIncident,
    diagnosis: &DiagnosticResult,
    risk_level: RiskLevel,
    prerequisites: &[&str],
    steps: Vec<RecoveryStep>,
) -> RecoveryPlan {
    let mut steps = steps;
    steps.push(
        RecoveryStep::new("verify", "Verify Health", actions::VERIFY_HEALTH, Duration::from_secs(30))
            .with_description("Confirm the node reports healthy")
            .with_parameter("node_id", incident.node_id.clone())
            .critical(false)
            .reversible(false),
    );
    RecoveryPlan {
        estimated_duration: strategy.estimated_duration(),
        success_probability: strategy.success_probability(incident, diagnosis),
        risk_level,
        prerequisites: prerequisites.iter().map(ToString::to_string).collect(),
        ..RecoveryPlan::new(strategy.name(), &incident.id, steps)
    }
}

/// Stop and restart the affected service.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceRestartStrategy;

impl RecoveryStrategy for ServiceRestartStrategy {
    fn name(&self) -> &str {
        "service_restart"
    }

    fn priority(&self) -> u8 {
        8
    }

    fn can_recover(&self, _incident: &SystemIncident, diagnosis: &DiagnosticResult) -> bool {
        matches!(
            diagnosis.root_cause.as_str(),
            "service_degradation" | "memory_exhaustion"
        )
    }

    fn success_probability(&self, _incident: &SystemIncident, diagnosis: &DiagnosticResult) -> f64 {
        if diagnosis.root_cause == "service_degradation" {
            0.9
        } else {
            0.7
        }
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(120)
    }

    fn create_plan(
        &self,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
    ) -> Result<RecoveryPlan, RecoveryError> {
        let steps = vec![
            RecoveryStep::new("stop", "Stop Service", actions::STOP_SERVICE, Duration::from_secs(60))
                .with_description("Gracefully stop the affected service")
                .with_parameter("service", DEFAULT_SERVICE),
            RecoveryStep::new("start", "Start Service", actions::START_SERVICE, Duration::from_secs(60))
                .with_description("Start the service with fresh state")
                .with_parameter("service", DEFAULT_SERVICE)
                .reversible(false),
        ];
        Ok(plan(self, incident, diagnosis, RiskLevel::Low, &["backup_check"], steps))
    }
}

/// Grow CPU and memory allocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceScalingStrategy;

impl RecoveryStrategy for ResourceScalingStrategy {
    fn name(&self) -> &str {
        "resource_scaling"
    }

    fn priority(&self) -> u8 {
        7
    }

    fn can_recover(&self, _incident: &SystemIncident, diagnosis: &DiagnosticResult) -> bool {
        matches!(
            diagnosis.root_cause.as_str(),
            "cpu_exhaustion" | "memory_exhaustion" | "resource_pressure"
        )
    }

    fn success_probability(&self, _incident: &SystemIncident, _diagnosis: &DiagnosticResult) -> f64 {
        0.85
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn create_plan(
        &self,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
    ) -> Result<RecoveryPlan, RecoveryError> {
        let steps = vec![RecoveryStep::new(
            "scale",
            "Scale Resources",
            actions::SCALE_RESOURCES,
            Duration::from_secs(180),
        )
        .with_description("Increase resource allocation")
        .with_parameter("cpu", "+50%")
        .with_parameter("memory", "+50%")];
        Ok(plan(self, incident, diagnosis, RiskLevel::Medium, &["resource_check"], steps))
    }
}

/// Roll configuration back to the stable version.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigResetStrategy;

impl RecoveryStrategy for ConfigResetStrategy {
    fn name(&self) -> &str {
        "config_reset"
    }

    fn priority(&self) -> u8 {
        6
    }

    fn can_recover(&self, _incident: &SystemIncident, diagnosis: &DiagnosticResult) -> bool {
        diagnosis.root_cause == "service_degradation"
    }

    fn success_probability(&self, _incident: &SystemIncident, _diagnosis: &DiagnosticResult) -> f64 {
        0.7
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(180)
    }

    fn create_plan(
        &self,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
    ) -> Result<RecoveryPlan, RecoveryError> {
        let steps = vec![RecoveryStep::new(
            "reset",
            "Reset Configuration",
            actions::RESET_CONFIG,
            Duration::from_secs(120),
        )
        .with_description("Reset to known good configuration")
        .with_parameter("config_version", "stable")];
        Ok(plan(self, incident, diagnosis, RiskLevel::Medium, &["config_backup"], steps))
    }
}

/// Drop caches to free memory and disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheClearingStrategy;

impl RecoveryStrategy for CacheClearingStrategy {
    fn name(&self) -> &str {
        "cache_clearing"
    }

    fn priority(&self) -> u8 {
        5
    }

    fn can_recover(&self, _incident: &SystemIncident, diagnosis: &DiagnosticResult) -> bool {
        matches!(
            diagnosis.root_cause.as_str(),
            "memory_exhaustion" | "service_degradation" | "disk_exhaustion"
        )
    }

    fn success_probability(&self, _incident: &SystemIncident, _diagnosis: &DiagnosticResult) -> f64 {
        0.6
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn create_plan(
        &self,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
    ) -> Result<RecoveryPlan, RecoveryError> {
        let steps = vec![RecoveryStep::new(
            "clear",
            "Clear Cache",
            actions::CLEAR_CACHE,
            Duration::from_secs(30),
        )
        .with_description("Clear system caches to free memory")
        .with_parameter("cache_type", "all")
        .critical(false)
        .reversible(false)];
        Ok(plan(self, incident, diagnosis, RiskLevel::Low, &[], steps))
    }
}

/// Reset network connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkRecoveryStrategy;

impl RecoveryStrategy for NetworkRecoveryStrategy {
    fn name(&self) -> &str {
        "network_recovery"
    }

    fn priority(&self) -> u8 {
        4
    }

    fn can_recover(&self, _incident: &SystemIncident, diagnosis: &DiagnosticResult) -> bool {
        diagnosis.root_cause == "network_issues"
    }

    fn success_probability(&self, _incident: &SystemIncident, _diagnosis: &DiagnosticResult) -> f64 {
        0.75
    }

    fn estimated_duration(&self) -> Duration {
        Duration::from_secs(240)
    }

    fn create_plan(
        &self,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
    ) -> Result<RecoveryPlan, RecoveryError> {
        let steps = vec![RecoveryStep::new(
            "reset",
            "Reset Network",
            actions::RESET_NETWORK,
            Duration::from_secs(120),
        )
        .with_description("Reset network connections")
        .with_parameter("interface", "all")];
        Ok(plan(self, incident, diagnosis, RiskLevel::High, &["network_check"], steps))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::incident::Severity;
    use pretty_assertions::assert_eq;

    fn incident() -> SystemIncident {
        SystemIncident::new("inc-1", "perf", Severity::High).with_node("node-1")
    }

    #[test]
    fn test_service_restart_plan() {
        let diagnosis = DiagnosticResult::new("inc-1", "service_degradation", 0.8);
        let plan = ServiceRestartStrategy.create_plan(&incident(), &diagnosis).unwrap();

        assert_eq!(plan.strategy_name, "service_restart");
        assert_eq!(plan.incident_id, "inc-1");
        assert_eq!(plan.risk_level, RiskLevel::Low);
        assert_eq!(plan.success_probability, 0.9);
        assert_eq!(plan.prerequisites, vec!["backup_check".to_string()]);

        let step_actions: Vec<&str> = plan.steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(
            step_actions,
            vec![actions::STOP_SERVICE, actions::START_SERVICE, actions::VERIFY_HEALTH]
        );
        assert!(plan.steps[0].critical && plan.steps[0].reversible);
        assert!(plan.steps[1].critical && !plan.steps[1].reversible);
        assert!(!plan.steps[2].critical);
        assert_eq!(plan.steps[2].parameters["node_id"], "node-1");
    }

    #[test]
    fn test_service_restart_probability_for_memory() {
        let diagnosis = DiagnosticResult::new("inc-1", "memory_exhaustion", 0.8);
        assert_eq!(ServiceRestartStrategy.success_probability(&incident(), &diagnosis), 0.7);
    }

    #[test]
    fn test_risk_levels() {
        let d = DiagnosticResult::new("inc-1", "network_issues", 0.8);
        assert_eq!(
            NetworkRecoveryStrategy.create_plan(&incident(), &d).unwrap().risk_level,
            RiskLevel::High
        );
        let d = DiagnosticResult::new("inc-1", "cpu_exhaustion", 0.8);
        assert_eq!(
            ResourceScalingStrategy.create_plan(&incident(), &d).unwrap().risk_level,
            RiskLevel::Medium
        );
    }
}
