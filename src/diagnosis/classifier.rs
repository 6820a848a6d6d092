//! ML root-cause classifier.
//!
//! A rule prior over named features combined with a nearest-centroid
//! model trained from labelled feature vectors. The trained model is an
//! immutable [`ModelSnapshot`]; retraining builds a new one and swaps the
//! `Arc` under a brief write lock, so predictions never wait on training.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::incident::SystemIncident;

use super::features::FeatureExtractor;
use super::types::{MlAnalysisResult, UNKNOWN_ROOT_CAUSE};

/// A labelled feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Feature vector in extractor order.
    pub features: Vec<f64>,
    /// Root cause label.
    pub label: String,
}

/// Mean feature vector of one label.
#[derive(Debug, Clone, PartialEq)]
pub struct Centroid {
    /// Root cause label.
    pub label: String,
    /// Mean feature vector.
    pub mean: Vec<f64>,
    /// Examples behind the mean.
    pub support: usize,
}

/// Immutable trained model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSnapshot {
    /// Incremented on every retrain.
    pub version: u64,
    /// One centroid per sufficiently supported label.
    pub centroids: Vec<Centroid>,
    /// Corpus size at training time.
    pub trained_on: usize,
}

/// Classifier configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Training corpus bound; oldest examples are dropped.
    pub max_training_examples: usize,
    /// Examples a label needs before it gets a centroid.
    pub min_samples_per_label: usize,
    /// Upper bound on learned confidence.
    pub learned_confidence_cap: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_training_examples: 5000,
            min_samples_per_label: 3,
            learned_confidence_cap: 0.85,
        }
    }
}

/// ML classifier.
#[derive(Debug)]
pub struct MlClassifier {
    config: ClassifierConfig,
    extractor: FeatureExtractor,
    model: RwLock<Arc<ModelSnapshot>>,
    corpus: Mutex<VecDeque<TrainingExample>>,
}

impl Default for MlClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl MlClassifier {
    /// Create a new, untrained classifier.
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
            model: RwLock::new(Arc::new(ModelSnapshot::default())),
            corpus: Mutex::new(VecDeque::new()),
        }
    }

    /// The feature extractor.
    #[must_use]
    pub const fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Current model snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::LockPoisoned`] if a writer panicked.
    pub fn snapshot(&self) -> Result<Arc<ModelSnapshot>, AnalysisError> {
        self.model
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| poisoned())
    }

    /// Predict the root cause of an incident.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::LockPoisoned`] if a writer panicked.
    pub fn predict(&self, incident: &SystemIncident) -> Result<MlAnalysisResult, AnalysisError> {
        let features = self.extractor.extract(incident);
        let model = self.snapshot()?;

        let (mut prediction, mut confidence) = self.rule_prior(&features);
        // Nothing observed: a centroid would only match on context.
        if !self.extractor.is_quiet(&features) {
            if let Some((label, learned)) = self.nearest(&model, &features) {
                if learned > confidence {
                    prediction = label;
                    confidence = learned;
                }
            }
        }

        Ok(MlAnalysisResult {
            prediction,
            confidence,
            features,
            model_version: model.version,
        })
    }

    fn feature(&self, features: &[f64], name: &str) -> f64 {
        self.extractor
            .index_of(name)
            .and_then(|i| features.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    fn rule_prior(&self, features: &[f64]) -> (String, f64) {
        let cpu = self.feature(features, "cpu_utilization");
        let memory = self.feature(features, "memory_utilization");

        let (label, confidence) = if cpu > 0.9 {
            ("cpu_exhaustion", 0.9)
        } else if memory > 0.9 {
            ("memory_exhaustion", 0.9)
        } else if cpu > 0.8 || memory > 0.8 {
            ("resource_pressure", 0.7)
        } else {
            (UNKNOWN_ROOT_CAUSE, 0.5)
        };
        (label.to_string(), confidence)
    }

    fn nearest(&self, model: &ModelSnapshot, features: &[f64]) -> Option<(String, f64)> {
        model
            .centroids
            .iter()
            .filter(|c| c.mean.len() == features.len())
            .map(|c| (c, distance(&c.mean, features)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(centroid, d)| {
                let confidence = (1.0 / (1.0 + d)).min(self.config.learned_confidence_cap);
                (centroid.label.clone(), confidence)
            })
    }

    /// Add a labelled example to the training corpus.
    ///
    /// Unknown labels and vectors of the wrong length are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::LockPoisoned`] if the corpus lock is poisoned.
    pub fn add_example(&self, example: TrainingExample) -> Result<bool, AnalysisError> {
        if example.label.is_empty()
            || example.label == UNKNOWN_ROOT_CAUSE
            || example.features.len() != self.extractor.len()
        {
            return Ok(false);
        }
        let mut corpus = self.corpus.lock().map_err(|_| poisoned())?;
        corpus.push_back(example);
        while corpus.len() > self.config.max_training_examples {
            corpus.pop_front();
        }
        Ok(true)
    }

    /// Number of examples in the corpus.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::LockPoisoned`] if the corpus lock is poisoned.
    pub fn corpus_len(&self) -> Result<usize, AnalysisError> {
        Ok(self.corpus.lock().map_err(|_| poisoned())?.len())
    }

    /// Retrain from the corpus and swap in the new model.
    ///
    /// Returns the new model version.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::LockPoisoned`] if a lock is poisoned.
    pub fn retrain(&self) -> Result<u64, AnalysisError> {
        let examples: Vec<TrainingExample> = {
            let corpus = self.corpus.lock().map_err(|_| poisoned())?;
            corpus.iter().cloned().collect()
        };

        let mut sums: BTreeMap<&str, (Vec<f64>, usize)> = BTreeMap::new();
        for example in &examples {
            let (sum, count) = sums
                .entry(example.label.as_str())
                .or_insert_with(|| (vec![0.0; example.features.len()], 0));
            for (acc, value) in sum.iter_mut().zip(&example.features) {
                *acc += value;
            }
            *count += 1;
        }

        let centroids = sums
            .into_iter()
            .filter(|(_, (_, count))| *count >= self.config.min_samples_per_label)
            .map(|(label, (sum, count))| {
                #[allow(clippy::cast_precision_loss)]
                let n = count as f64;
                Centroid {
                    label: label.to_string(),
                    mean: sum.into_iter().map(|v| v / n).collect(),
                    support: count,
                }
            })
            .collect();

        let version = self.snapshot()?.version + 1;
        let next = Arc::new(ModelSnapshot {
            version,
            centroids,
            trained_on: examples.len(),
        });

        let mut guard = self.model.write().map_err(|_| poisoned())?;
        *guard = next;
        Ok(version)
    }
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn poisoned() -> AnalysisError {
    AnalysisError::LockPoisoned {
        analyzer: "ml".into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::incident::{metric_keys, Severity};
    use test_case::test_case;

    fn incident(cpu: f64, memory: f64) -> SystemIncident {
        SystemIncident::new("inc-1", "perf", Severity::Medium)
            .with_metric(metric_keys::CPU_UTILIZATION, cpu)
            .with_metric(metric_keys::MEMORY_UTILIZATION, memory)
    }

    #[test_case(0.95, 0.1, "cpu_exhaustion", 0.9 ; "cpu")]
    #[test_case(0.1, 0.95, "memory_exhaustion", 0.9 ; "memory")]
    #[test_case(0.85, 0.1, "resource_pressure", 0.7 ; "pressure")]
    #[test_case(0.1, 0.1, "unknown", 0.5 ; "quiet")]
    fn test_rule_prior(cpu: f64, memory: f64, label: &str, confidence: f64) {
        let classifier = MlClassifier::default();
        let result = classifier.predict(&incident(cpu, memory)).unwrap();
        assert_eq!(result.prediction, label);
        assert_eq!(result.confidence, confidence);
        assert_eq!(result.features.len(), 20);
        assert_eq!(result.model_version, 0);
    }

    #[test]
    fn test_learned_label_overrides_weaker_prior() {
        let classifier = MlClassifier::default();
        let noisy = SystemIncident::new("inc-x", "io", Severity::High)
            .with_metric(metric_keys::DISK_IO_RATE, 0.97)
            .with_metric(metric_keys::DISK_UTILIZATION, 0.6);
        let features = classifier.extractor().extract(&noisy);
        for _ in 0..3 {
            let accepted = classifier
                .add_example(TrainingExample {
                    features: features.clone(),
                    label: "disk_contention".to_string(),
                })
                .unwrap();
            assert!(accepted);
        }

        assert_eq!(classifier.predict(&noisy).unwrap().prediction, "unknown");
        let version = classifier.retrain().unwrap();
        assert_eq!(version, 1);

        let result = classifier.predict(&noisy).unwrap();
        assert_eq!(result.prediction, "disk_contention");
        assert_eq!(result.confidence, 0.85);
        assert_eq!(result.model_version, 1);
    }

    #[test]
    fn test_quiet_incident_ignores_learned_model() {
        let classifier = MlClassifier::default();
        let degraded = SystemIncident::new("inc-x", "service", Severity::High)
            .with_metric(metric_keys::ERROR_RATE, 0.15);
        let features = classifier.extractor().extract(&degraded);
        for _ in 0..3 {
            classifier
                .add_example(TrainingExample {
                    features: features.clone(),
                    label: "service_degradation".to_string(),
                })
                .unwrap();
        }
        classifier.retrain().unwrap();
        assert_eq!(
            classifier.predict(&degraded).unwrap().prediction,
            "service_degradation"
        );

        let quiet = SystemIncident::new("inc-q", "service", Severity::High);
        let result = classifier.predict(&quiet).unwrap();
        assert_eq!(result.prediction, UNKNOWN_ROOT_CAUSE);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_learned_label_never_beats_hard_rule() {
        let classifier = MlClassifier::default();
        let hot = incident(0.95, 0.1);
        let features = classifier.extractor().extract(&hot);
        for _ in 0..5 {
            classifier
                .add_example(TrainingExample {
                    features: features.clone(),
                    label: "something_else".to_string(),
                })
                .unwrap();
        }
        classifier.retrain().unwrap();
        assert_eq!(classifier.predict(&hot).unwrap().prediction, "cpu_exhaustion");
    }

    #[test]
    fn test_under_supported_label_has_no_centroid() {
        let classifier = MlClassifier::default();
        let features = classifier.extractor().extract(&incident(0.2, 0.2));
        classifier
            .add_example(TrainingExample {
                features,
                label: "rare".to_string(),
            })
            .unwrap();
        classifier.retrain().unwrap();
        assert!(classifier.snapshot().unwrap().centroids.is_empty());
    }

    #[test]
    fn test_add_example_rejects_unknown_and_bad_length() {
        let classifier = MlClassifier::default();
        let unknown = TrainingExample {
            features: vec![0.0; 20],
            label: "unknown".to_string(),
        };
        let short = TrainingExample {
            features: vec![0.0; 3],
            label: "cpu_exhaustion".to_string(),
        };
        assert!(!classifier.add_example(unknown).unwrap());
        assert!(!classifier.add_example(short).unwrap());
        assert_eq!(classifier.corpus_len().unwrap(), 0);
    }

    #[test]
    fn test_corpus_is_bounded() {
        let classifier = MlClassifier::new(ClassifierConfig {
            max_training_examples: 4,
            ..ClassifierConfig::default()
        });
        for i in 0..10 {
            classifier
                .add_example(TrainingExample {
                    features: vec![f64::from(i); 20],
                    label: "cpu_exhaustion".to_string(),
                })
                .unwrap();
        }
        assert_eq!(classifier.corpus_len().unwrap(), 4);
    }
}
