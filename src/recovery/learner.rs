//! Per-strategy outcome statistics.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::knowledge::SuccessRate;

use super::types::RecoveryResult;

/// Outcomes of one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    /// Strategy name.
    pub strategy: String,
    /// Finished operations.
    pub executions: u64,
    /// Operations that ended `completed`.
    pub successes: u64,
    /// Operations rolled back.
    pub rollbacks: u64,
    /// Rolling success rate.
    pub success_rate: SuccessRate,
    /// Mean recovery rate.
    pub avg_recovery_rate: f64,
    /// Last finish time.
    pub last_used: DateTime<Utc>,
}

impl StrategyStats {
    fn new(strategy: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            executions: 0,
            successes: 0,
            rollbacks: 0,
            success_rate: SuccessRate::default(),
            avg_recovery_rate: 0.0,
            last_used: Utc::now(),
        }
    }

    fn record(&mut self, result: &RecoveryResult) {
        self.executions += 1;
        if result.success {
            self.successes += 1;
        }
        if result.rollback_performed {
            self.rollbacks += 1;
        }
        self.success_rate.record(result.success);
        #[allow(clippy::cast_precision_loss)]
        let n = self.executions as f64;
        self.avg_recovery_rate = self.avg_recovery_rate * (n - 1.0) / n + result.recovery_rate / n;
        self.last_used = result.timestamp;
    }
}

/// Collects [`StrategyStats`] from finished operations.
#[derive(Debug, Default)]
pub struct StrategyLearner {
    stats: RwLock<HashMap<String, StrategyStats>>,
}

impl StrategyLearner {
    /// Create an empty learner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a finished operation into its strategy's statistics.
    pub fn record(&self, result: &RecoveryResult) {
        self.stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(result.strategy_name.clone())
            .or_insert_with(|| StrategyStats::new(&result.strategy_name))
            .record(result);
    }

    /// Statistics of one strategy.
    #[must_use]
    pub fn stats(&self, strategy: &str) -> Option<StrategyStats> {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(strategy)
            .cloned()
    }

    /// Statistics of all strategies, sorted by name.
    #[must_use]
    pub fn all(&self) -> Vec<StrategyStats> {
        let mut all: Vec<StrategyStats> = self
            .stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.strategy.cmp(&b.strategy));
        all
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_recovery_result;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_accumulates() {
        let learner = StrategyLearner::new();
        learner.record(&create_test_recovery_result("cpu_exhaustion", "resource_scaling", 2, 0));
        let mut rolled_back = create_test_recovery_result("cpu_exhaustion", "resource_scaling", 0, 2);
        rolled_back.rollback_performed = true;
        learner.record(&rolled_back);
        learner.record(&create_test_recovery_result("network_issues", "network_recovery", 1, 0));

        let stats = learner.stats("resource_scaling").unwrap();
        assert_eq!(stats.executions, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.rollbacks, 1);
        assert!((stats.success_rate.rate - 0.5).abs() < 1e-9);
        assert!((stats.avg_recovery_rate - 0.5).abs() < 1e-9);

        let names: Vec<String> = learner.all().into_iter().map(|s| s.strategy).collect();
        assert_eq!(names, vec!["network_recovery", "resource_scaling"]);
        assert!(learner.stats("cache_clearing").is_none());
    }
}
