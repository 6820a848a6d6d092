//! Root-cause analysis.
//!
//! Threshold rules over the metric snapshot produce hypotheses. A causal
//! model then promotes a fired cause over a fired effect it is known to
//! produce, and yields the causal chain from the chosen cause.

use std::sync::{Arc, RwLock};

use crate::error::AnalysisError;
use crate::incident::{metric_keys, SystemIncident};
use crate::knowledge::CausalRelationship;

use super::types::{CauseHypothesis, RootCauseAnalysisResult, UNKNOWN_ROOT_CAUSE};

/// Confidence of the fallback `unknown` cause.
pub const UNKNOWN_CONFIDENCE: f64 = 0.5;

/// Confidence of the always-present fallback alternative.
const FALLBACK_ALTERNATIVE_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, Copy)]
struct Rule {
    cause: &'static str,
    metric: &'static str,
    threshold: f64,
    confidence: f64,
}

const RULES: [Rule; 5] = [
    Rule {
        cause: "cpu_exhaustion",
        metric: metric_keys::CPU_UTILIZATION,
        threshold: 0.9,
        confidence: 0.9,
    },
    Rule {
        cause: "memory_exhaustion",
        metric: metric_keys::MEMORY_UTILIZATION,
        threshold: 0.9,
        confidence: 0.9,
    },
    Rule {
        cause: "disk_exhaustion",
        metric: metric_keys::DISK_UTILIZATION,
        threshold: 0.9,
        confidence: 0.9,
    },
    Rule {
        cause: "service_degradation",
        metric: metric_keys::ERROR_RATE,
        threshold: 0.1,
        confidence: 0.8,
    },
    Rule {
        cause: "network_issues",
        metric: metric_keys::NETWORK_ERROR_RATE,
        threshold: 0.1,
        confidence: 0.7,
    },
];

/// Cause/effect edges known to the analyzer.
#[derive(Debug, Clone, Default)]
pub struct CausalModel {
    /// Edges, at most one per (cause, effect).
    pub relationships: Vec<CausalRelationship>,
    /// Incremented on every swap.
    pub version: u64,
}

impl CausalModel {
    /// Strength of the `cause -> effect` edge, if known.
    #[must_use]
    pub fn strength(&self, cause: &str, effect: &str) -> Option<f64> {
        self.relationships
            .iter()
            .find(|r| r.cause == cause && r.effect == effect)
            .map(|r| r.strength)
    }

    fn merge(&mut self, relationship: CausalRelationship) {
        if let Some(existing) = self
            .relationships
            .iter_mut()
            .find(|r| r.cause == relationship.cause && r.effect == relationship.effect)
        {
            *existing = relationship;
        } else {
            self.relationships.push(relationship);
        }
    }
}

/// Built-in causal relationships.
#[must_use]
pub fn default_relationships() -> Vec<CausalRelationship> {
    [
        ("memory_exhaustion", "service_degradation", 0.7),
        ("cpu_exhaustion", "service_degradation", 0.6),
        ("disk_exhaustion", "service_degradation", 0.5),
        ("network_issues", "service_degradation", 0.6),
        ("memory_exhaustion", "cpu_exhaustion", 0.4),
    ]
    .into_iter()
    .map(|(cause, effect, strength)| CausalRelationship::new(cause, effect, strength))
    .collect()
}

/// Root-cause analyzer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RootCauseConfig {
    /// Edge strength needed for a fired cause to take over a fired effect.
    pub promotion_strength: f64,
}

impl Default for RootCauseConfig {
    fn default() -> Self {
        Self {
            promotion_strength: 0.6,
        }
    }
}

/// Root-cause analyzer.
#[derive(Debug)]
pub struct RootCauseAnalyzer {
    config: RootCauseConfig,
    model: RwLock<Arc<CausalModel>>,
}

impl Default for RootCauseAnalyzer {
    fn default() -> Self {
        Self::new(RootCauseConfig::default())
    }
}

impl RootCauseAnalyzer {
    /// Create a new analyzer seeded with [`default_relationships`].
    #[must_use]
    pub fn new(config: RootCauseConfig) -> Self {
        Self {
            config,
            model: RwLock::new(Arc::new(CausalModel {
                relationships: default_relationships(),
                version: 1,
            })),
        }
    }

    /// Current causal model snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::LockPoisoned`] if a writer panicked.
    pub fn causal_model(&self) -> Result<Arc<CausalModel>, AnalysisError> {
        self.model
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| poisoned())
    }

    /// Analyze the incident's metric snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::LockPoisoned`] if a writer panicked.
    pub fn analyze(
        &self,
        incident: &SystemIncident,
    ) -> Result<RootCauseAnalysisResult, AnalysisError> {
        let model = self.causal_model()?;

        let mut fired: Vec<CauseHypothesis> = RULES
            .iter()
            .filter(|rule| incident.metric(rule.metric) > rule.threshold)
            .map(|rule| CauseHypothesis {
                cause: rule.cause.to_string(),
                confidence: rule.confidence,
                evidence: vec![format!(
                    "{}={:.2}",
                    rule.metric,
                    incident.metric(rule.metric)
                )],
            })
            .collect();
        // Stable: rule order breaks confidence ties.
        fired.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let (primary, confidence) = match self.pick_primary(&fired, &model) {
            Some(index) => {
                let hypothesis = fired.remove(index);
                (hypothesis.cause, hypothesis.confidence)
            }
            None => (UNKNOWN_ROOT_CAUSE.to_string(), UNKNOWN_CONFIDENCE),
        };

        let causal_chain = fired
            .iter()
            .filter_map(|effect| {
                model
                    .strength(&primary, &effect.cause)
                    .map(|s| format!("{primary} -> {} ({s:.2})", effect.cause))
            })
            .collect();

        let mut alternatives = fired;
        if alternatives.is_empty() {
            let fallback = if primary == "network_issues" {
                "resource_pressure"
            } else {
                "network_issues"
            };
            alternatives.push(CauseHypothesis {
                cause: fallback.to_string(),
                confidence: FALLBACK_ALTERNATIVE_CONFIDENCE,
                evidence: vec![metric_keys::NETWORK_UTILIZATION.to_string()],
            });
        }

        Ok(RootCauseAnalysisResult {
            primary_cause: primary,
            confidence,
            alternatives,
            causal_chain,
        })
    }

    /// Strongest hypothesis, unless another fired hypothesis is a known cause of it.
    fn pick_primary(&self, fired: &[CauseHypothesis], model: &CausalModel) -> Option<usize> {
        let strongest = fired.first()?;
        let promoted = fired.iter().position(|candidate| {
            model
                .strength(&candidate.cause, &strongest.cause)
                .is_some_and(|s| s >= self.config.promotion_strength)
        });
        Some(promoted.unwrap_or(0))
    }

    /// Merge relationships into the causal model and swap it in.
    ///
    /// Later entries for the same (cause, effect) replace earlier ones.
    /// Returns the size of the new model.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::LockPoisoned`] if the lock is poisoned.
    pub fn update_causal_model(
        &self,
        relationships: &[CausalRelationship],
    ) -> Result<usize, AnalysisError> {
        let current = self.causal_model()?;
        let mut next = CausalModel {
            relationships: current.relationships.clone(),
            version: current.version + 1,
        };
        for relationship in relationships {
            next.merge(relationship.clone());
        }
        let size = next.relationships.len();

        let mut guard = self.model.write().map_err(|_| poisoned())?;
        *guard = Arc::new(next);
        Ok(size)
    }
}

fn poisoned() -> AnalysisError {
    AnalysisError::LockPoisoned {
        analyzer: "root_cause".into(),
    }
}
