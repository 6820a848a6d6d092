//! Incident diagnosis.
//!
//! Four analyzers inspect an incident independently:
//!
//! - [`MlClassifier`]: rule prior plus a retrained nearest-centroid model
//! - [`LogAnalyzer`]: anomalies, recurring messages, correlated bursts
//! - [`PatternRecognizer`]: symptom matching against known failure patterns
//! - [`RootCauseAnalyzer`]: metric thresholds plus a causal model
//!
//! [`DiagnosisEngine`] runs them in parallel and [`fuse`]s their output
//! into a single [`DiagnosticResult`].

mod classifier;
mod engine;
mod features;
mod fusion;
mod log_analyzer;
mod patterns;
mod root_cause;
mod types;

pub use classifier::{Centroid, ClassifierConfig, MlClassifier, ModelSnapshot, TrainingExample};
pub use engine::{methods, DiagnosisEngine, LearningReport, DIAGNOSTIC_HISTORY_LIMIT};
pub use features::FeatureExtractor;
pub use fusion::{default_actions, fuse, Fused, ESCALATION_ACTIONS};
pub use log_analyzer::{LogAnalyzer, LogAnalyzerConfig, HIGH_ERROR_RATE};
pub use patterns::{
    default_patterns, FailurePattern, PatternEvent, PatternLibrary, PatternRecognizer,
    PatternRecognizerConfig,
};
pub use root_cause::{
    default_relationships, CausalModel, RootCauseAnalyzer, RootCauseConfig, UNKNOWN_CONFIDENCE,
};
pub use types::{
    AnalysisDetails, CauseHypothesis, DiagnosisMetadata, DiagnosticResult, LogAnalysisResult,
    LogAnomaly, LogCorrelation, LogPattern, MlAnalysisResult, PatternAnalysisResult,
    PatternMatch, RootCauseAnalysisResult, UNKNOWN_ROOT_CAUSE,
};
