//! Diagnosis engine.
//!
//! Fans the four analyzers out as tokio tasks, fans them back in against
//! a shared deadline and an optional cancellation signal, fuses the
//! results, and records the diagnosis.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::DiagnosisConfig;
use crate::error::{AnalysisError, AppError};
use crate::incident::SystemIncident;
use crate::knowledge::KnowledgeStore;
use crate::recovery::{RecoveryFeedback, RecoveryResult};
use crate::signal::cancelled;

use super::classifier::{MlClassifier, TrainingExample};
use super::fusion::fuse;
use super::log_analyzer::{LogAnalyzer, LogAnalyzerConfig};
use super::patterns::{PatternRecognizer, PatternRecognizerConfig};
use super::root_cause::RootCauseAnalyzer;
use super::types::{AnalysisDetails, DiagnosisMetadata, DiagnosticResult};

/// Number of diagnoses kept in memory.
pub const DIAGNOSTIC_HISTORY_LIMIT: usize = 100;

/// Analysis method names, in fusion order.
pub mod methods {
    /// ML classifier.
    pub const ML: &str = "ml_classification";
    /// Log analyzer.
    pub const LOG: &str = "log_analysis";
    /// Pattern recognizer.
    pub const PATTERN: &str = "pattern_matching";
    /// Root-cause analyzer.
    pub const ROOT_CAUSE: &str = "root_cause_analysis";
}

type AnalysisTask<T> = JoinHandle<Result<T, AnalysisError>>;

/// What one learning cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearningReport {
    /// Verified incidents newly added to the training corpus.
    pub examples_added: usize,
    /// Classifier model version after retraining.
    pub model_version: u64,
    /// Patterns learned from history.
    pub patterns_learned: usize,
    /// Size of the causal model after syncing.
    pub causal_relationships: usize,
}

/// Diagnosis engine.
pub struct DiagnosisEngine {
    config: DiagnosisConfig,
    classifier: Arc<MlClassifier>,
    log_analyzer: Arc<LogAnalyzer>,
    patterns: Arc<PatternRecognizer>,
    root_cause: Arc<RootCauseAnalyzer>,
    knowledge: Arc<dyn KnowledgeStore>,
    history: Mutex<VecDeque<DiagnosticResult>>,
    trained_incidents: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for DiagnosisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosisEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DiagnosisEngine {
    /// Create a new engine with default analyzers.
    #[must_use]
    pub fn new(config: DiagnosisConfig, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        let patterns = PatternRecognizer::new(PatternRecognizerConfig {
            match_threshold: config.pattern_match_threshold,
            ..PatternRecognizerConfig::default()
        });
        let log_analyzer = LogAnalyzer::new(LogAnalyzerConfig {
            max_entries: config.max_log_entries,
            ..LogAnalyzerConfig::default()
        });
        Self {
            config,
            classifier: Arc::new(MlClassifier::default()),
            log_analyzer: Arc::new(log_analyzer),
            patterns: Arc::new(patterns),
            root_cause: Arc::new(RootCauseAnalyzer::default()),
            knowledge,
            history: Mutex::new(VecDeque::with_capacity(DIAGNOSTIC_HISTORY_LIMIT)),
            trained_incidents: Mutex::new(HashSet::new()),
        }
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &DiagnosisConfig {
        &self.config
    }

    /// The ML classifier.
    #[must_use]
    pub fn classifier(&self) -> &MlClassifier {
        &self.classifier
    }

    /// The pattern recognizer.
    #[must_use]
    pub fn patterns(&self) -> &PatternRecognizer {
        &self.patterns
    }

    /// The root-cause analyzer.
    #[must_use]
    pub fn root_cause_analyzer(&self) -> &RootCauseAnalyzer {
        &self.root_cause
    }

    /// Diagnose an incident. Never fails; see [`Self::diagnose_with_cancel`].
    pub async fn diagnose(&self, incident: &SystemIncident) -> DiagnosticResult {
        let (_keep_open, cancel) = watch::channel(false);
        self.diagnose_with_cancel(incident, cancel).await
    }

    /// Diagnose an incident, abandoning unfinished analyzers on cancellation.
    ///
    /// Analyzers still running at the deadline or on cancellation count as
    /// zero-confidence; results that already arrived are kept.
    pub async fn diagnose_with_cancel(
        &self,
        incident: &SystemIncident,
        mut cancel: watch::Receiver<bool>,
    ) -> DiagnosticResult {
        let started = Instant::now();
        let deadline = started + self.config.analysis_timeout;
        info!(
            incident_id = %incident.id,
            incident_type = %incident.incident_type,
            severity = %incident.severity,
            "Starting diagnosis"
        );

        let shared = Arc::new(incident.clone());

        let ml_task = self.config.enable_ml_diagnosis.then(|| {
            let classifier = Arc::clone(&self.classifier);
            let incident = Arc::clone(&shared);
            tokio::spawn(async move { classifier.predict(&incident) })
        });
        let log_task = self.config.enable_log_analysis.then(|| {
            let analyzer = Arc::clone(&self.log_analyzer);
            let incident = Arc::clone(&shared);
            tokio::spawn(async move { Ok(analyzer.analyze(&incident.logs)) })
        });
        let pattern_task = self.config.enable_pattern_matching.then(|| {
            let recognizer = Arc::clone(&self.patterns);
            let incident = Arc::clone(&shared);
            tokio::spawn(async move { recognizer.analyze(&incident) })
        });
        let root_cause_task = self.config.enable_root_cause_analysis.then(|| {
            let analyzer = Arc::clone(&self.root_cause);
            let incident = Arc::clone(&shared);
            tokio::spawn(async move { analyzer.analyze(&incident) })
        });

        let mut analysis_methods = Vec::new();
        let mut details = AnalysisDetails::default();

        if let Some(ml) = collect(methods::ML, ml_task, started, deadline, &mut cancel).await {
            details.ml = ml;
            analysis_methods.push(methods::ML.to_string());
        }
        if let Some(log) = collect(methods::LOG, log_task, started, deadline, &mut cancel).await {
            details.log = log;
            analysis_methods.push(methods::LOG.to_string());
        }
        if let Some(pattern) =
            collect(methods::PATTERN, pattern_task, started, deadline, &mut cancel).await
        {
            details.pattern = pattern;
            analysis_methods.push(methods::PATTERN.to_string());
        }
        if let Some(rca) =
            collect(methods::ROOT_CAUSE, root_cause_task, started, deadline, &mut cancel).await
        {
            details.root_cause = rca;
            analysis_methods.push(methods::ROOT_CAUSE.to_string());
        }

        let fused = fuse(incident, &details, &self.config.fusion);
        let result = DiagnosticResult {
            incident_id: incident.id.clone(),
            root_cause: fused.root_cause,
            confidence: fused.confidence,
            evidence: fused.evidence,
            recommended_actions: fused.recommended_actions,
            alternative_causes: fused.alternative_causes,
            analysis: details,
            duration: started.elapsed(),
            timestamp: Utc::now(),
            metadata: DiagnosisMetadata {
                incident_type: incident.incident_type.clone(),
                severity: incident.severity,
                analysis_methods,
            },
        };

        info!(
            incident_id = %result.incident_id,
            root_cause = %result.root_cause,
            confidence = result.confidence,
            duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
            "Diagnosis complete"
        );

        self.record(incident, &result).await;
        result
    }

    async fn record(&self, incident: &SystemIncident, result: &DiagnosticResult) {
        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if history.len() >= DIAGNOSTIC_HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(result.clone());
        }

        if let Err(e) = self.knowledge.update_from_diagnosis(incident, result).await {
            warn!(incident_id = %result.incident_id, error = %e, "Failed to record diagnosis");
        }
    }

    /// Recent diagnoses, oldest first.
    #[must_use]
    pub fn diagnostic_history(&self) -> Vec<DiagnosticResult> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Run one learning cycle.
    ///
    /// Adds newly verified incidents to the training corpus, retrains the
    /// classifier, refreshes the pattern library from history, and syncs
    /// the causal model with the knowledge base.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] if the knowledge base cannot be read and
    /// [`AppError::Analysis`] if an analyzer lock is poisoned.
    pub async fn learn_cycle(&self) -> Result<LearningReport, AppError> {
        let verified = self.knowledge.verified_incidents().await?;
        let mut examples_added = 0;
        {
            let mut trained = self
                .trained_incidents
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for record in verified {
                if trained.contains(&record.id) {
                    continue;
                }
                let added = self.classifier.add_example(TrainingExample {
                    features: record.features,
                    label: record.root_cause,
                })?;
                if added {
                    examples_added += 1;
                }
                trained.insert(record.id);
            }
        }
        let model_version = self.classifier.retrain()?;

        let history = self.knowledge.incidents().await?;
        let patterns_learned = self.patterns.learn_from_history(&history)?;

        let relationships = self.knowledge.causal_relationships().await?;
        let causal_relationships = self.root_cause.update_causal_model(&relationships)?;

        let report = LearningReport {
            examples_added,
            model_version,
            patterns_learned,
            causal_relationships,
        };
        info!(
            examples_added,
            model_version,
            patterns_learned,
            causal_relationships,
            "Learning cycle complete"
        );
        Ok(report)
    }

    /// Spawn the background learning loop.
    ///
    /// Runs [`Self::learn_cycle`] every `learning_interval` until `shutdown`
    /// becomes `true` or its sender is dropped.
    pub fn spawn_learning_loop(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.config.learning_interval);

            // Skip the first immediate tick
            interval.tick().await;

            info!(
                interval_secs = engine.config.learning_interval.as_secs(),
                "Learning loop started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = engine.learn_cycle().await {
                            warn!(error = %e, "Learning cycle failed");
                        }
                    }
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            info!("Learning loop shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}

impl RecoveryFeedback for DiagnosisEngine {
    fn record_recovery(
        &self,
        incident: &SystemIncident,
        diagnosis: &DiagnosticResult,
        result: &RecoveryResult,
    ) {
        if !result.success || diagnosis.is_unknown() {
            return;
        }
        let features = if diagnosis.analysis.ml.features.is_empty() {
            self.classifier.extractor().extract(incident)
        } else {
            diagnosis.analysis.ml.features.clone()
        };
        match self.classifier.add_example(TrainingExample {
            features,
            label: diagnosis.root_cause.clone(),
        }) {
            Ok(added) => debug!(
                incident_id = %incident.id,
                label = %diagnosis.root_cause,
                added,
                "Recovery fed back to classifier"
            ),
            Err(e) => warn!(incident_id = %incident.id, error = %e, "Failed to record recovery feedback"),
        }
    }
}

/// Await one analyzer against the deadline and the cancel signal.
///
/// Returns `None` for a disabled, failed, panicked, late, or cancelled
/// analyzer. Late tasks are detached, not aborted.
async fn collect<T>(
    analyzer: &str,
    task: Option<AnalysisTask<T>>,
    started: Instant,
    deadline: Instant,
    cancel: &mut watch::Receiver<bool>,
) -> Option<T> {
    let mut task = task?;

    tokio::select! {
        biased;

        joined = &mut task => match joined {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(analyzer, error = %e, "Analyzer failed, using zero confidence");
                None
            }
            Err(join_error) => {
                let e = AnalysisError::TaskFailed {
                    analyzer: analyzer.to_string(),
                    message: join_error.to_string(),
                };
                warn!(analyzer, error = %e, "Analyzer failed, using zero confidence");
                None
            }
        },
        () = tokio::time::sleep_until(deadline) => {
            let e = AnalysisError::Timeout {
                analyzer: analyzer.to_string(),
                elapsed_ms: elapsed_ms(started),
            };
            warn!(analyzer, error = %e, "Analyzer abandoned, using zero confidence");
            None
        }
        () = cancelled(cancel) => {
            let e = AnalysisError::Cancelled { analyzer: analyzer.to_string() };
            warn!(analyzer, error = %e, "Analyzer abandoned, using zero confidence");
            None
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
