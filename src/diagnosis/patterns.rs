//! Failure pattern recognition.
//!
//! Symptoms are matched against the event descriptions of each known
//! [`FailurePattern`]. The library is an immutable snapshot behind an
//! `RwLock<Arc<_>>`; the learning loop builds a replacement off to the
//! side and swaps it in.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::incident::{duration_millis, SystemIncident};
use crate::knowledge::HistoricalIncident;

use super::types::{PatternAnalysisResult, PatternMatch, UNKNOWN_ROOT_CAUSE};

/// Confidence given to patterns promoted from history.
const LEARNED_PATTERN_CONFIDENCE: f64 = 0.7;

/// One step of a failure pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEvent {
    /// Event type.
    pub event_type: String,
    /// Emitting component.
    pub source: String,
    /// Description matched against symptoms.
    pub description: String,
    /// Offset from the first event of the pattern.
    #[serde(with = "duration_millis")]
    pub relative_time: Duration,
    /// Tolerance around `relative_time`.
    #[serde(with = "duration_millis")]
    pub time_window: Duration,
    /// Whether the event must be present.
    pub required: bool,
}

impl PatternEvent {
    fn step(event_type: &str, source: &str, description: &str, offset_secs: u64) -> Self {
        Self {
            event_type: event_type.to_string(),
            source: source.to_string(),
            description: description.to_string(),
            relative_time: Duration::from_secs(offset_secs),
            time_window: Duration::from_secs(60),
            required: true,
        }
    }
}

/// A known failure signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePattern {
    /// Pattern ID.
    pub id: String,
    /// Pattern name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Ordered event sequence.
    pub events: Vec<PatternEvent>,
    /// Times the pattern has been observed.
    pub frequency: u64,
    /// Pattern confidence.
    pub confidence: f64,
    /// Root cause the pattern indicates.
    pub root_cause: String,
    /// Remediation hints.
    pub remediation: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl FailurePattern {
    fn builtin(
        id: &str,
        name: &str,
        root_cause: &str,
        events: Vec<PatternEvent>,
        remediation: &[&str],
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: format!("Built-in {name} signature"),
            events,
            frequency: 0,
            confidence: 0.9,
            root_cause: root_cause.to_string(),
            remediation: remediation.iter().map(ToString::to_string).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Fraction of `symptoms` found in any event description, case-insensitively.
    ///
    /// Blank symptoms are ignored.
    #[must_use]
    pub fn similarity(&self, symptoms: &[String]) -> f64 {
        let symptoms: Vec<String> = symptoms
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symptoms.is_empty() || self.events.is_empty() {
            return 0.0;
        }
        let descriptions: Vec<String> = self
            .events
            .iter()
            .map(|e| e.description.to_lowercase())
            .collect();
        let matched = symptoms
            .iter()
            .filter(|symptom| descriptions.iter().any(|d| d.contains(symptom.as_str())))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let similarity = matched as f64 / symptoms.len() as f64;
        similarity
    }
}

/// The built-in pattern library.
#[must_use]
pub fn default_patterns() -> Vec<FailurePattern> {
    vec![
        FailurePattern::builtin(
            "cpu-saturation",
            "CPU saturation",
            "cpu_exhaustion",
            vec![
                PatternEvent::step("metric", "node", "high cpu usage sustained", 0),
                PatternEvent::step("metric", "service", "request latency increase", 30),
                PatternEvent::step("log", "service", "thread pool saturation", 60),
            ],
            &["Scale up CPU resources", "Throttle CPU-intensive background jobs"],
        ),
        FailurePattern::builtin(
            "memory-leak",
            "Memory leak",
            "memory_exhaustion",
            vec![
                PatternEvent::step("metric", "node", "memory usage growing steadily", 0),
                PatternEvent::step("log", "runtime", "garbage collection pressure", 300),
                PatternEvent::step("event", "kernel", "out of memory kill", 600),
            ],
            &["Restart the leaking service", "Check for memory leaks"],
        ),
        FailurePattern::builtin(
            "disk-full",
            "Disk full",
            "disk_exhaustion",
            vec![
                PatternEvent::step("metric", "node", "disk space low", 0),
                PatternEvent::step("log", "storage", "write failures on volume", 60),
                PatternEvent::step("log", "logging", "log rotation failure", 120),
            ],
            &["Clean up disk space", "Archive old data"],
        ),
        FailurePattern::builtin(
            "service-crash-loop",
            "Service crash loop",
            "service_degradation",
            vec![
                PatternEvent::step("event", "orchestrator", "service restart loop", 0),
                PatternEvent::step("metric", "probe", "health check failures", 10),
                PatternEvent::step("metric", "service", "elevated error rate", 20),
            ],
            &["Restart affected services", "Review recent deployments"],
        ),
        FailurePattern::builtin(
            "network-partition",
            "Network partition",
            "network_issues",
            vec![
                PatternEvent::step("metric", "network", "packet loss between nodes", 0),
                PatternEvent::step("log", "rpc", "connection timeouts", 5),
                PatternEvent::step("event", "cluster", "peer unreachable", 15),
            ],
            &["Check network connectivity", "Verify network configuration"],
        ),
    ]
}

/// Immutable pattern library snapshot.
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    /// Known patterns.
    pub patterns: Vec<FailurePattern>,
    /// Incremented on every swap.
    pub version: u64,
}

/// Configuration for the pattern recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRecognizerConfig {
    /// Minimum similarity for a match.
    pub match_threshold: f64,
    /// Observations needed before a recurring signature becomes a pattern.
    pub frequency_threshold: u64,
}

impl Default for PatternRecognizerConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.8,
            frequency_threshold: 3,
        }
    }
}

/// Pattern recognizer.
#[derive(Debug)]
pub struct PatternRecognizer {
    config: PatternRecognizerConfig,
    library: RwLock<Arc<PatternLibrary>>,
}

impl PatternRecognizer {
    /// Create a new recognizer seeded with [`default_patterns`].
    #[must_use]
    pub fn new(config: PatternRecognizerConfig) -> Self {
        Self::with_patterns(config, default_patterns())
    }

    /// Create a recognizer with an explicit library.
    #[must_use]
    pub fn with_patterns(config: PatternRecognizerConfig, patterns: Vec<FailurePattern>) -> Self {
        Self {
            config,
            library: RwLock::new(Arc::new(PatternLibrary {
                patterns,
                version: 1,
            })),
        }
    }

    /// Current library snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::LockPoisoned`] if a writer panicked.
    pub fn snapshot(&self) -> Result<Arc<PatternLibrary>, AnalysisError> {
        self.library
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| AnalysisError::LockPoisoned {
                analyzer: "pattern".into(),
            })
    }

    /// Match the incident's symptoms against the library.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::LockPoisoned`] if a writer panicked.
    pub fn analyze(&self, incident: &SystemIncident) -> Result<PatternAnalysisResult, AnalysisError> {
        let library = self.snapshot()?;
        let mut matches: Vec<PatternMatch> = library
            .patterns
            .iter()
            .filter_map(|pattern| {
                let similarity = pattern.similarity(&incident.symptoms);
                (similarity > 0.0 && similarity >= self.config.match_threshold).then(|| {
                    PatternMatch {
                        pattern_id: pattern.id.clone(),
                        name: pattern.name.clone(),
                        similarity,
                        confidence: (similarity * pattern.confidence).clamp(0.0, 1.0),
                        root_cause: pattern.root_cause.clone(),
                        remediation: pattern.remediation.clone(),
                    }
                })
            })
            .collect();
        matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let confidence = matches.first().map_or(0.0, |m| m.confidence);
        Ok(PatternAnalysisResult {
            matches,
            confidence,
        })
    }

    /// Rebuild the library from diagnosis history and swap it in.
    ///
    /// Existing patterns get their frequency raised to the number of
    /// historical incidents they match. A (root cause, symptom set) pair
    /// seen at least `frequency_threshold` times that no pattern covers
    /// becomes a learned pattern. Returns the number of new patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::LockPoisoned`] if the lock is poisoned.
    pub fn learn_from_history(&self, history: &[HistoricalIncident]) -> Result<usize, AnalysisError> {
        let current = self.snapshot()?;
        let mut patterns = current.patterns.clone();
        let now = Utc::now();

        for pattern in &mut patterns {
            let seen = history
                .iter()
                .filter(|h| {
                    h.root_cause == pattern.root_cause
                        && pattern.similarity(&h.symptoms) >= self.config.match_threshold
                })
                .count() as u64;
            if seen > pattern.frequency {
                pattern.frequency = seen;
                pattern.updated_at = now;
            }
        }

        let mut signatures: HashMap<(String, BTreeSet<String>), (u64, &HistoricalIncident)> =
            HashMap::new();
        for record in history {
            if record.root_cause == UNKNOWN_ROOT_CAUSE {
                continue;
            }
            let symptoms: BTreeSet<String> = record
                .symptoms
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if symptoms.is_empty() {
                continue;
            }
            let slot = signatures
                .entry((record.root_cause.clone(), symptoms))
                .or_insert((0, record));
            slot.0 += 1;
        }

        let mut learned: Vec<_> = signatures
            .into_iter()
            .filter(|(_, (count, _))| *count >= self.config.frequency_threshold)
            .collect();
        learned.sort_by(|a, b| a.0.cmp(&b.0));

        let mut added = 0;
        for ((root_cause, symptoms), (count, example)) in learned {
            let symptom_list: Vec<String> = symptoms.iter().cloned().collect();
            let covered = patterns.iter().any(|p| {
                p.root_cause == root_cause
                    && p.similarity(&symptom_list) >= self.config.match_threshold
            });
            if covered {
                continue;
            }
            patterns.push(FailurePattern {
                id: format!("learned-{root_cause}-{}", symptom_list.join("-").replace(' ', "_")),
                name: format!("Learned {root_cause}"),
                description: format!("Recurring {root_cause} signature from history"),
                events: symptom_list
                    .iter()
                    .map(|s| PatternEvent::step("symptom", "history", s, 0))
                    .collect(),
                frequency: count,
                confidence: LEARNED_PATTERN_CONFIDENCE,
                root_cause,
                remediation: example.recommended_actions.clone(),
                created_at: now,
                updated_at: now,
            });
            added += 1;
        }

        let next = Arc::new(PatternLibrary {
            patterns,
            version: current.version + 1,
        });
        let mut guard = self
            .library
            .write()
            .map_err(|_| AnalysisError::LockPoisoned {
                analyzer: "pattern".into(),
            })?;
        *guard = next;
        Ok(added)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::incident::Severity;

    fn incident_with(symptoms: &[&str]) -> SystemIncident {
        symptoms
            .iter()
            .fold(SystemIncident::new("inc-1", "perf", Severity::High), |i, s| {
                i.with_symptom(*s)
            })
    }

    fn record(root_cause: &str, symptoms: &[&str]) -> HistoricalIncident {
        HistoricalIncident {
            id: uuid::Uuid::new_v4().to_string(),
            incident_type: "perf".to_string(),
            description: String::new(),
            root_cause: root_cause.to_string(),
            confidence: 0.9,
            symptoms: symptoms.iter().map(ToString::to_string).collect(),
            recommended_actions: vec!["Drain the node".to_string()],
            features: Vec::new(),
            duration: Duration::ZERO,
            timestamp: Utc::now(),
            verified: false,
        }
    }

    #[test]
    fn test_similarity_case_insensitive_substring() {
        let pattern = &default_patterns()[0];
        let symptoms = vec!["HIGH CPU".to_string(), "latency".to_string()];
        assert_eq!(pattern.similarity(&symptoms), 1.0);
        let symptoms = vec!["high cpu".to_string(), "disk".to_string()];
        assert_eq!(pattern.similarity(&symptoms), 0.5);
        assert_eq!(pattern.similarity(&[]), 0.0);
    }

    #[test]
    fn test_analyze_matches_cpu_saturation() {
        let recognizer = PatternRecognizer::new(PatternRecognizerConfig::default());
        let result = recognizer
            .analyze(&incident_with(&["high cpu", "thread pool saturation"]))
            .unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].root_cause, "cpu_exhaustion");
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_partial_overlap_below_threshold() {
        let recognizer = PatternRecognizer::new(PatternRecognizerConfig::default());
        let result = recognizer
            .analyze(&incident_with(&["high cpu", "cosmic rays"]))
            .unwrap();
        assert!(result.matches.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_no_symptoms_no_match() {
        let recognizer = PatternRecognizer::new(PatternRecognizerConfig::default());
        let result = recognizer.analyze(&incident_with(&[])).unwrap();
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_blank_symptoms_match_nothing() {
        let pattern = &default_patterns()[0];
        assert_eq!(pattern.similarity(&[String::new(), "   ".to_string()]), 0.0);
        let symptoms = vec!["".to_string(), "high cpu".to_string()];
        assert_eq!(pattern.similarity(&symptoms), 1.0);

        let recognizer = PatternRecognizer::new(PatternRecognizerConfig::default());
        let result = recognizer.analyze(&incident_with(&["", "  "])).unwrap();
        assert!(result.matches.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_learn_promotes_recurring_signature() {
        let recognizer = PatternRecognizer::new(PatternRecognizerConfig::default());
        let history: Vec<_> = (0..3)
            .map(|_| record("gpu_exhaustion", &["GPU memory full", "cuda oom"]))
            .collect();

        let added = recognizer.learn_from_history(&history).unwrap();
        assert_eq!(added, 1);
        let library = recognizer.snapshot().unwrap();
        assert_eq!(library.version, 2);

        let result = recognizer
            .analyze(&incident_with(&["gpu memory full", "CUDA OOM"]))
            .unwrap();
        assert_eq!(result.matches[0].root_cause, "gpu_exhaustion");
        assert_eq!(result.matches[0].remediation, vec!["Drain the node".to_string()]);

        // Relearning from the same history adds nothing new
        assert_eq!(recognizer.learn_from_history(&history).unwrap(), 0);
    }

    #[test]
    fn test_learn_below_frequency_threshold() {
        let recognizer = PatternRecognizer::new(PatternRecognizerConfig::default());
        let history = vec![record("gpu_exhaustion", &["gpu hot"]); 2];
        assert_eq!(recognizer.learn_from_history(&history).unwrap(), 0);
    }

    #[test]
    fn test_learn_updates_frequency_of_known_pattern() {
        let recognizer = PatternRecognizer::new(PatternRecognizerConfig::default());
        let history = vec![record("network_issues", &["packet loss", "peer unreachable"]); 4];
        assert_eq!(recognizer.learn_from_history(&history).unwrap(), 0);
        let library = recognizer.snapshot().unwrap();
        let partition = library
            .patterns
            .iter()
            .find(|p| p.id == "network-partition")
            .unwrap();
        assert_eq!(partition.frequency, 4);
    }
}
