//! Feature extraction for the ML classifier.
//!
//! Features are kept in alphabetical order by name so a trained model
//! stays valid across restarts and across additions to the table.

use chrono::{Datelike, Timelike};

use crate::incident::{metric_keys, SystemIncident};

type FeatureFn = fn(&SystemIncident) -> f64;

/// Features describing when and where an incident happened rather than
/// anything observed about it.
const CONTEXT_FEATURES: [&str; 4] = [
    "day_of_week",
    "node_health",
    "severity_score",
    "time_of_day",
];

/// Turns an incident into a fixed-order numeric vector.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    features: Vec<(&'static str, FeatureFn)>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    /// Create a new extractor with the built-in feature table.
    #[must_use]
    pub fn new() -> Self {
        let table: [(&'static str, FeatureFn); 20] = [
            ("cpu_utilization", |i| i.metric(metric_keys::CPU_UTILIZATION)),
            ("cpu_load", |i| i.metric(metric_keys::LOAD_AVERAGE)),
            ("memory_utilization", |i| {
                i.metric(metric_keys::MEMORY_UTILIZATION)
            }),
            ("memory_pressure", |i| i.metric(metric_keys::MEMORY_PRESSURE)),
            ("disk_utilization", |i| i.metric(metric_keys::DISK_UTILIZATION)),
            ("disk_io", |i| i.metric(metric_keys::DISK_IO_RATE)),
            ("network_utilization", |i| {
                i.metric(metric_keys::NETWORK_UTILIZATION)
            }),
            ("network_errors", |i| i.metric(metric_keys::NETWORK_ERROR_RATE)),
            ("error_rate", |i| i.metric(metric_keys::ERROR_RATE)),
            ("response_time", |i| {
                (i.metric(metric_keys::RESPONSE_TIME) / 10.0).min(1.0)
            }),
            ("throughput", |i| i.metric(metric_keys::THROUGHPUT) / 1000.0),
            ("service_count", |i| {
                i.metric(metric_keys::ACTIVE_SERVICES) / 100.0
            }),
            ("connection_count", |i| {
                i.metric(metric_keys::CONNECTION_COUNT) / 1000.0
            }),
            ("time_of_day", |i| f64::from(i.detected_at.hour()) / 24.0),
            ("day_of_week", |i| {
                f64::from(i.detected_at.weekday().num_days_from_sunday()) / 7.0
            }),
            ("symptom_count", |i| count(i.symptoms.len()) / 10.0),
            ("log_error_rate", log_error_rate),
            ("event_frequency", event_frequency),
            ("severity_score", |i| i.severity.score()),
            ("node_health", node_health),
        ];
        let mut features = table.to_vec();
        features.sort_by(|a, b| a.0.cmp(b.0));
        Self { features }
    }

    /// Feature names in vector order.
    #[must_use]
    pub fn feature_names(&self) -> Vec<&'static str> {
        self.features.iter().map(|(name, _)| *name).collect()
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Always false; the table is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Position of a feature in the vector.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|(n, _)| *n == name)
    }

    /// True when every observed feature is zero, so only context remains.
    #[must_use]
    pub fn is_quiet(&self, features: &[f64]) -> bool {
        self.features
            .iter()
            .zip(features)
            .filter(|((name, _), _)| !CONTEXT_FEATURES.contains(name))
            .all(|(_, value)| value.abs() < f64::EPSILON)
    }

    /// Extract the feature vector. Non-finite values become `0.0`.
    #[must_use]
    pub fn extract(&self, incident: &SystemIncident) -> Vec<f64> {
        self.features
            .iter()
            .map(|(_, f)| {
                let value = f(incident);
                if value.is_finite() {
                    value
                } else {
                    0.0
                }
            })
            .collect()
    }
}

#[allow(clippy::cast_precision_loss)]
fn count(n: usize) -> f64 {
    n as f64
}

fn log_error_rate(incident: &SystemIncident) -> f64 {
    if incident.logs.is_empty() {
        return 0.0;
    }
    let errors = incident.logs.iter().filter(|l| l.is_error()).count();
    count(errors) / count(incident.logs.len())
}

/// Events per minute over the incident window.
fn event_frequency(incident: &SystemIncident) -> f64 {
    if incident.events.is_empty() {
        return 0.0;
    }
    let window = incident.detected_at - incident.start_time;
    #[allow(clippy::cast_precision_loss)]
    let minutes = window.num_milliseconds() as f64 / 60_000.0;
    if minutes <= 0.0 {
        return 1.0;
    }
    count(incident.events.len()) / minutes
}

fn node_health(incident: &SystemIncident) -> f64 {
    let health = 1.0
        - 0.3 * incident.metric(metric_keys::CPU_UTILIZATION)
        - 0.3 * incident.metric(metric_keys::MEMORY_UTILIZATION)
        - 0.2 * incident.metric(metric_keys::DISK_UTILIZATION)
        - 0.2 * incident.metric(metric_keys::ERROR_RATE);
    health.max(0.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::incident::{LogEntry, Severity, SystemEvent};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_feature_names_sorted_and_unique() {
        let extractor = FeatureExtractor::new();
        let names = extractor.feature_names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(names, sorted);
        assert_eq!(extractor.len(), 20);
    }

    #[test]
    fn test_empty_incident_extracts_without_panic() {
        let extractor = FeatureExtractor::new();
        let incident = SystemIncident::new("inc-1", "unknown", Severity::Low);
        let features = extractor.extract(&incident);
        assert_eq!(features.len(), extractor.len());
        assert!(features.iter().all(|v| v.is_finite()));

        let health = features[extractor.index_of("node_health").unwrap()];
        assert_eq!(health, 1.0);
    }

    #[test]
    fn test_quiet_ignores_context_features() {
        let extractor = FeatureExtractor::new();
        let quiet = SystemIncident::new("inc-1", "unknown", Severity::Critical);
        assert!(extractor.is_quiet(&extractor.extract(&quiet)));

        let symptomatic = quiet.clone().with_symptom("pods restarting");
        assert!(!extractor.is_quiet(&extractor.extract(&symptomatic)));

        let loaded = quiet.with_metric(metric_keys::ERROR_RATE, 0.01);
        assert!(!extractor.is_quiet(&extractor.extract(&loaded)));
    }

    #[test]
    fn test_scaled_metrics() {
        let extractor = FeatureExtractor::new();
        let incident = SystemIncident::new("inc-1", "perf", Severity::Critical)
            .with_metric(metric_keys::RESPONSE_TIME, 30.0)
            .with_metric(metric_keys::THROUGHPUT, 500.0)
            .with_metric(metric_keys::CPU_UTILIZATION, f64::INFINITY);
        let features = extractor.extract(&incident);
        let at = |name| features[extractor.index_of(name).unwrap()];

        assert_eq!(at("response_time"), 1.0);
        assert_eq!(at("throughput"), 0.5);
        assert_eq!(at("cpu_utilization"), 0.0);
        assert_eq!(at("severity_score"), 1.0);
    }

    #[test]
    fn test_log_and_event_features() {
        let extractor = FeatureExtractor::new();
        let start = Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();
        let detected = start + Duration::minutes(2);
        let incident = SystemIncident::new("inc-1", "svc", Severity::High)
            .with_window(start, detected)
            .with_log(LogEntry::new(start, "ERROR", "api", "boom"))
            .with_log(LogEntry::new(start, "INFO", "api", "ok"))
            .with_event(SystemEvent::new("restart", "k8s", "pod restarted", start))
            .with_event(SystemEvent::new("restart", "k8s", "pod restarted", start));
        let features = extractor.extract(&incident);
        let at = |name| features[extractor.index_of(name).unwrap()];

        assert_eq!(at("log_error_rate"), 0.5);
        assert_eq!(at("event_frequency"), 1.0);
        assert_eq!(at("time_of_day"), 12.0 / 24.0);
        // 2024-03-03 was a Sunday
        assert_eq!(at("day_of_week"), 0.0);
    }

    #[test]
    fn test_event_frequency_zero_window() {
        let now = Utc::now();
        let incident = SystemIncident::new("inc-1", "svc", Severity::Low)
            .with_window(now, now)
            .with_event(SystemEvent::new("x", "y", "z", now));
        assert_eq!(event_frequency(&incident), 1.0);
    }

    #[test]
    fn test_node_health_floor() {
        let incident = SystemIncident::new("inc-1", "svc", Severity::Low)
            .with_metric(metric_keys::CPU_UTILIZATION, 2.0)
            .with_metric(metric_keys::MEMORY_UTILIZATION, 2.0);
        assert_eq!(node_health(&incident), 0.0);
    }
}
