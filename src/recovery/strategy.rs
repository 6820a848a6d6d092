//! Recovery strategies and their registry.

use std::sync::Arc;
use std::time::Duration;

use crate::diagnosis::DiagnosticResult;
use crate::error::RecoveryError;
use crate::incident::SystemIncident;

use super::strategies::{
    CacheClearingStrategy, ConfigResetStrategy, NetworkRecoveryStrategy, ResourceScalingStrategy,
    ServiceRestartStrategy,
};
use super::types::RecoveryPlan;

/// A way of recovering from a class of root causes.
pub trait RecoveryStrategy: Send + Sync {
    /// Unique strategy name.
    fn name(&self) -> &str;

    /// Selection priority, higher first.
    fn priority(&self) -> u8;

    /// True if the strategy handles this diagnosis.
    fn can_recover(&self, incident: &SystemIncident, diagnosis: &DiagnosticResult) -> bool;

    /// Estimated probability of success, 0.0 to 1.0.
    fn success_probability(&self, incident: &SystemIncident, diagnosis: &DiagnosticResult) -> f64;

    /// Expected wall time of a plan.
    fn estimated_duration(&self) -> Duration;

    /// Build a plan for the incident.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::PlanCreation`] if no plan can be built.
    fn create_plan(
        &self,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
    ) -> Result<RecoveryPlan, RecoveryError>;
}

/// Strategies ordered by descending priority.
///
/// Registration order breaks priority ties.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn RecoveryStrategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

impl StrategyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in strategies.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ServiceRestartStrategy));
        registry.register(Arc::new(ResourceScalingStrategy));
        registry.register(Arc::new(ConfigResetStrategy));
        registry.register(Arc::new(CacheClearingStrategy));
        registry.register(Arc::new(NetworkRecoveryStrategy));
        registry
    }

    /// Register a strategy, replacing any strategy with the same name.
    pub fn register(&mut self, strategy: Arc<dyn RecoveryStrategy>) {
        self.strategies.retain(|s| s.name() != strategy.name());
        let position = self
            .strategies
            .iter()
            .position(|s| s.priority() < strategy.priority())
            .unwrap_or(self.strategies.len());
        self.strategies.insert(position, strategy);
    }

    /// Strategy names in selection order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// True if no strategy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// First strategy, in selection order, that can handle the diagnosis.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::NoApplicableStrategy`] if none can.
    pub fn select(
        &self,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
    ) -> Result<Arc<dyn RecoveryStrategy>, RecoveryError> {
        self.strategies
            .iter()
            .find(|s| s.can_recover(incident, diagnosis))
            .cloned()
            .ok_or_else(|| RecoveryError::NoApplicableStrategy {
                root_cause: diagnosis.root_cause.clone(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::incident::Severity;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    struct Fixed {
        name: &'static str,
        priority: u8,
    }

    impl RecoveryStrategy for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> u8 {
            self.priority
        }
        fn can_recover(&self, _: &SystemIncident, _: &DiagnosticResult) -> bool {
            true
        }
        fn success_probability(&self, _: &SystemIncident, _: &DiagnosticResult) -> f64 {
            1.0
        }
        fn estimated_duration(&self) -> Duration {
            Duration::ZERO
        }
        fn create_plan(
            &self,
            incident: &SystemIncident,
            _: &DiagnosticResult,
        ) -> Result<RecoveryPlan, RecoveryError> {
            Ok(RecoveryPlan::new(self.name, &incident.id, Vec::new()))
        }
    }

    #[test]
    fn test_default_order() {
        assert_eq!(
            StrategyRegistry::with_defaults().names(),
            vec![
                "service_restart",
                "resource_scaling",
                "config_reset",
                "cache_clearing",
                "network_recovery",
            ]
        );
    }

    #[test]
    fn test_ties_keep_registration_order_and_names_replace() {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(Fixed { name: "a", priority: 5 }));
        registry.register(Arc::new(Fixed { name: "b", priority: 5 }));
        registry.register(Arc::new(Fixed { name: "c", priority: 9 }));
        registry.register(Arc::new(Fixed { name: "a", priority: 1 }));
        assert_eq!(registry.names(), vec!["c", "b", "a"]);
        assert_eq!(registry.len(), 3);
    }

    #[test_case("service_degradation", "service_restart")]
    #[test_case("memory_exhaustion", "service_restart")]
    #[test_case("cpu_exhaustion", "resource_scaling")]
    #[test_case("resource_pressure", "resource_scaling")]
    #[test_case("disk_exhaustion", "cache_clearing")]
    #[test_case("network_issues", "network_recovery")]
    fn test_select(root_cause: &str, expected: &str) {
        let registry = StrategyRegistry::with_defaults();
        let incident = SystemIncident::new("inc-1", "perf", Severity::High);
        let diagnosis = DiagnosticResult::new("inc-1", root_cause, 0.9);
        assert_eq!(registry.select(&incident, &diagnosis).unwrap().name(), expected);
    }

    #[test]
    fn test_select_unknown_fails() {
        let registry = StrategyRegistry::with_defaults();
        let incident = SystemIncident::new("inc-1", "perf", Severity::High);
        let diagnosis = DiagnosticResult::new("inc-1", "unknown", 0.9);
        let err = registry.select(&incident, &diagnosis).err().unwrap();
        assert_eq!(
            err,
            RecoveryError::NoApplicableStrategy {
                root_cause: "unknown".into()
            }
        );
    }
}
