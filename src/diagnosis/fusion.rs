//! Evidence fusion.
//!
//! Combines the four analyzer outputs into one root cause, a confidence,
//! evidence, recommended actions, and alternative causes. Contributions
//! are always visited in the order ML, log, pattern, root cause.

use crate::config::FusionWeights;
use crate::incident::{Severity, SystemIncident};

use super::types::{AnalysisDetails, UNKNOWN_ROOT_CAUSE};

/// Actions prepended for critical incidents.
pub const ESCALATION_ACTIONS: [&str; 2] = [
    "Escalate to on-call engineer",
    "Activate incident response",
];

/// Fusion output, before engine metadata is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Fused {
    /// Root cause, never empty.
    pub root_cause: String,
    /// Confidence, 0.0 to 1.0.
    pub confidence: f64,
    /// Evidence strings.
    pub evidence: Vec<String>,
    /// Recommended actions.
    pub recommended_actions: Vec<String>,
    /// Alternative causes, never containing `root_cause`.
    pub alternative_causes: Vec<String>,
}

/// Fuse analyzer results.
#[must_use]
pub fn fuse(incident: &SystemIncident, details: &AnalysisDetails, weights: &FusionWeights) -> Fused {
    let mut root_cause = UNKNOWN_ROOT_CAUSE.to_string();
    let mut confidence = 0.0;
    let mut evidence = Vec::new();
    let mut actions: Vec<String> = Vec::new();

    let ml = &details.ml;
    let ml_contributes = ml.confidence > weights.gate;
    if ml_contributes {
        root_cause.clone_from(&ml.prediction);
        confidence += ml.confidence * weights.ml;
        evidence.push(format!(
            "ML analysis: {} ({:.2} confidence)",
            ml.prediction, ml.confidence
        ));
    }

    let log = &details.log;
    if log.confidence > weights.gate {
        confidence += log.confidence * weights.log;
        evidence.extend(log.insights.iter().map(|i| format!("Log analysis: {i}")));
    }

    let pattern = &details.pattern;
    if pattern.confidence > weights.gate && !pattern.matches.is_empty() {
        confidence += pattern.confidence * weights.pattern;
        for matched in &pattern.matches {
            evidence.push(format!(
                "Pattern match: {} ({:.2} similarity)",
                matched.name, matched.similarity
            ));
            actions.extend(matched.remediation.iter().cloned());
        }
    }

    let rca = &details.root_cause;
    if rca.confidence > weights.gate {
        let ml_effective = if ml_contributes { ml.confidence } else { 0.0 };
        if root_cause == UNKNOWN_ROOT_CAUSE || rca.confidence >= ml_effective {
            root_cause.clone_from(&rca.primary_cause);
        }
        confidence += rca.confidence * weights.root_cause;
        evidence.push(format!(
            "Root cause analysis: {} ({:.2} confidence)",
            rca.primary_cause, rca.confidence
        ));
    }

    if root_cause.is_empty() {
        root_cause = UNKNOWN_ROOT_CAUSE.to_string();
    }

    if actions.is_empty() {
        actions = default_actions(&root_cause)
            .iter()
            .map(ToString::to_string)
            .collect();
    }
    if incident.severity == Severity::Critical {
        let mut escalated: Vec<String> = ESCALATION_ACTIONS.iter().map(ToString::to_string).collect();
        escalated.append(&mut actions);
        actions = escalated;
    }

    let mut alternative_causes: Vec<String> = Vec::new();
    let ml_alternative = ml_contributes.then_some(&ml.prediction);
    for cause in rca
        .alternatives
        .iter()
        .map(|a| &a.cause)
        .chain(std::iter::once(&rca.primary_cause).filter(|_| rca.confidence > weights.gate))
        .chain(ml_alternative)
    {
        if *cause != root_cause && cause != UNKNOWN_ROOT_CAUSE && !alternative_causes.contains(cause) {
            alternative_causes.push(cause.clone());
        }
    }

    Fused {
        root_cause,
        confidence: confidence.clamp(0.0, 1.0),
        evidence,
        recommended_actions: actions,
        alternative_causes,
    }
}

/// Default recommended actions for a root cause.
#[must_use]
pub fn default_actions(root_cause: &str) -> &'static [&'static str] {
    match root_cause {
        "cpu_exhaustion" => &[
            "Scale up CPU resources",
            "Optimize CPU-intensive processes",
            "Check for CPU-bound tasks",
        ],
        "memory_exhaustion" => &[
            "Increase memory allocation",
            "Check for memory leaks",
            "Optimize memory usage",
        ],
        "disk_exhaustion" => &[
            "Clean up disk space",
            "Archive old data",
            "Add storage capacity",
        ],
        "service_degradation" => &[
            "Restart affected services",
            "Check service health",
            "Review recent deployments",
        ],
        "network_issues" => &[
            "Check network connectivity",
            "Verify network configuration",
            "Monitor network latency",
        ],
        "resource_pressure" => &[
            "Monitor resource usage",
            "Consider scaling resources",
            "Optimize resource allocation",
        ],
        _ => &[
            "Monitor system closely",
            "Check system logs",
            "Verify system health",
        ],
    }
}
