//! Diagnosis result types.
//!
//! Every analyzer result has a zero-confidence [`Default`], which is what
//! the engine substitutes for a disabled, failed, timed-out or cancelled
//! analyzer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::incident::{duration_millis, Severity};

/// Root cause used when nothing better is known.
pub const UNKNOWN_ROOT_CAUSE: &str = "unknown";

/// Output of the ML classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlAnalysisResult {
    /// Predicted root cause.
    pub prediction: String,
    /// Prediction confidence.
    pub confidence: f64,
    /// Extracted feature vector, in alphabetical feature order.
    pub features: Vec<f64>,
    /// Version of the model snapshot that produced the prediction.
    pub model_version: u64,
}

impl Default for MlAnalysisResult {
    fn default() -> Self {
        Self {
            prediction: UNKNOWN_ROOT_CAUSE.to_string(),
            confidence: 0.0,
            features: Vec::new(),
            model_version: 0,
        }
    }
}

/// A log anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogAnomaly {
    /// Anomaly kind.
    pub kind: String,
    /// Description.
    pub description: String,
    /// Anomaly score, 0.0 to 1.0.
    pub score: f64,
    /// When the anomalous window ended.
    pub timestamp: DateTime<Utc>,
}

/// A repeating log message shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPattern {
    /// Normalized message prefix.
    pub pattern: String,
    /// Number of lines sharing the prefix.
    pub frequency: usize,
    /// `min(1, frequency / 10)`.
    pub confidence: f64,
}

/// A cluster of lines from one source inside the correlation window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogCorrelation {
    /// Log source.
    pub source: String,
    /// Lines in the cluster.
    pub event_count: usize,
    /// First line of the cluster.
    pub first_seen: DateTime<Utc>,
    /// Last line of the cluster.
    pub last_seen: DateTime<Utc>,
    /// Correlation strength.
    pub correlation: f64,
}

/// Output of the log analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogAnalysisResult {
    /// Detected anomalies.
    pub anomalies: Vec<LogAnomaly>,
    /// Repeating patterns.
    pub patterns: Vec<LogPattern>,
    /// Correlated clusters.
    pub correlations: Vec<LogCorrelation>,
    /// Human-readable insights.
    pub insights: Vec<String>,
    /// Analysis confidence.
    pub confidence: f64,
}

/// A failure pattern that matched the incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Pattern ID.
    pub pattern_id: String,
    /// Pattern name.
    pub name: String,
    /// Symptom similarity.
    pub similarity: f64,
    /// `similarity * pattern confidence`.
    pub confidence: f64,
    /// Root cause the pattern points to.
    pub root_cause: String,
    /// Remediation hints carried by the pattern.
    pub remediation: Vec<String>,
}

/// Output of the pattern recognizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysisResult {
    /// Matches, best first.
    pub matches: Vec<PatternMatch>,
    /// Best match confidence, `0.0` with no match.
    pub confidence: f64,
}

/// A candidate root cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CauseHypothesis {
    /// Root cause label.
    pub cause: String,
    /// Hypothesis confidence.
    pub confidence: f64,
    /// Metrics backing the hypothesis.
    pub evidence: Vec<String>,
}

/// Output of the root-cause analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseAnalysisResult {
    /// Most likely cause.
    pub primary_cause: String,
    /// Confidence in the primary cause.
    pub confidence: f64,
    /// Other hypotheses, strongest first.
    pub alternatives: Vec<CauseHypothesis>,
    /// Causal chain from the primary cause, as `cause -> effect` edges.
    pub causal_chain: Vec<String>,
}

impl Default for RootCauseAnalysisResult {
    fn default() -> Self {
        Self {
            primary_cause: UNKNOWN_ROOT_CAUSE.to_string(),
            confidence: 0.0,
            alternatives: Vec::new(),
            causal_chain: Vec::new(),
        }
    }
}

/// Per-analyzer details attached to a diagnosis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDetails {
    /// ML classifier output.
    pub ml: MlAnalysisResult,
    /// Log analyzer output.
    pub log: LogAnalysisResult,
    /// Pattern recognizer output.
    pub pattern: PatternAnalysisResult,
    /// Root-cause analyzer output.
    pub root_cause: RootCauseAnalysisResult,
}

/// Diagnosis metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisMetadata {
    /// Incident type.
    pub incident_type: String,
    /// Incident severity.
    pub severity: Severity,
    /// Analyzers that produced a result in time.
    pub analysis_methods: Vec<String>,
}

/// The fused diagnosis of one incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    /// Diagnosed incident.
    pub incident_id: String,
    /// Root cause, never empty.
    pub root_cause: String,
    /// Fused confidence, 0.0 to 1.0.
    pub confidence: f64,
    /// Evidence, in analyzer order.
    pub evidence: Vec<String>,
    /// Recommended actions.
    pub recommended_actions: Vec<String>,
    /// Other plausible causes.
    pub alternative_causes: Vec<String>,
    /// Raw analyzer output.
    pub analysis: AnalysisDetails,
    /// Wall time of the diagnosis.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// When the diagnosis finished.
    pub timestamp: DateTime<Utc>,
    /// Metadata.
    pub metadata: DiagnosisMetadata,
}

impl DiagnosticResult {
    /// Create a bare diagnosis, mainly for callers that diagnose elsewhere.
    #[must_use]
    pub fn new(incident_id: impl Into<String>, root_cause: impl Into<String>, confidence: f64) -> Self {
        let root_cause = root_cause.into();
        Self {
            incident_id: incident_id.into(),
            root_cause: if root_cause.is_empty() {
                UNKNOWN_ROOT_CAUSE.to_string()
            } else {
                root_cause
            },
            confidence: confidence.clamp(0.0, 1.0),
            evidence: Vec::new(),
            recommended_actions: Vec::new(),
            alternative_causes: Vec::new(),
            analysis: AnalysisDetails::default(),
            duration: Duration::ZERO,
            timestamp: Utc::now(),
            metadata: DiagnosisMetadata::default(),
        }
    }

    /// True when the root cause is `unknown`.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.root_cause == UNKNOWN_ROOT_CAUSE
    }

    /// Confidence that the root cause is right, as used to gate recovery.
    ///
    /// The strongest analyzer that concluded `root_cause`, or the fused
    /// confidence when that is higher. Always `0.0` for `unknown`.
    #[must_use]
    pub fn decision_confidence(&self) -> f64 {
        if self.is_unknown() {
            return 0.0;
        }
        let analysis = &self.analysis;
        let ml = (analysis.ml.prediction == self.root_cause).then_some(analysis.ml.confidence);
        let rca = (analysis.root_cause.primary_cause == self.root_cause)
            .then_some(analysis.root_cause.confidence);
        let patterns = analysis
            .pattern
            .matches
            .iter()
            .filter(|m| m.root_cause == self.root_cause)
            .map(|m| m.confidence);

        ml.into_iter()
            .chain(rca)
            .chain(patterns)
            .fold(self.confidence, f64::max)
            .clamp(0.0, 1.0)
    }
}
