//! Log analysis.
//!
//! Looks at the incident's log window for three things: an elevated
//! error ratio, repeating message shapes, and bursts of lines from the
//! same source.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::incident::LogEntry;

use super::types::{LogAnalysisResult, LogAnomaly, LogCorrelation, LogPattern};

/// Anomaly kind reported for an elevated error ratio.
pub const HIGH_ERROR_RATE: &str = "high_error_rate";

/// Configuration for the log analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct LogAnalyzerConfig {
    /// Newest entries kept for analysis.
    pub max_entries: usize,
    /// Error/fatal ratio above which an anomaly is flagged.
    pub anomaly_threshold: f64,
    /// Maximum gap between lines of one correlated cluster.
    pub correlation_window: Duration,
    /// Characters of the normalized message used as the pattern key.
    pub pattern_prefix_len: usize,
    /// Strength assigned to a correlated cluster.
    pub correlation_strength: f64,
}

impl Default for LogAnalyzerConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            anomaly_threshold: 0.1,
            correlation_window: Duration::from_secs(300),
            pattern_prefix_len: 50,
            correlation_strength: 0.8,
        }
    }
}

/// Log analyzer.
#[derive(Debug, Clone, Default)]
pub struct LogAnalyzer {
    config: LogAnalyzerConfig,
}

impl LogAnalyzer {
    /// Create a new log analyzer.
    #[must_use]
    pub const fn new(config: LogAnalyzerConfig) -> Self {
        Self { config }
    }

    /// Create a log analyzer with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(LogAnalyzerConfig::default())
    }

    /// Analyze a log window.
    #[must_use]
    pub fn analyze(&self, logs: &[LogEntry]) -> LogAnalysisResult {
        if logs.is_empty() {
            return LogAnalysisResult::default();
        }

        let window = self.bounded(logs);
        let anomalies = self.detect_anomalies(&window);
        let patterns = self.find_patterns(&window);
        let correlations = self.find_correlations(&window);
        let insights = generate_insights(&anomalies, &patterns, &correlations);

        // Counted in tenths so the full score is exactly 1.0.
        let mut tenths: u8 = 5;
        if !anomalies.is_empty() {
            tenths += 2;
        }
        if !patterns.is_empty() {
            tenths += 2;
        }
        if !correlations.is_empty() {
            tenths += 1;
        }

        LogAnalysisResult {
            anomalies,
            patterns,
            correlations,
            insights,
            confidence: (f64::from(tenths) / 10.0).min(1.0),
        }
    }

    /// Newest `max_entries` lines, in time order.
    fn bounded<'a>(&self, logs: &'a [LogEntry]) -> Vec<&'a LogEntry> {
        let mut window: Vec<&LogEntry> = logs.iter().collect();
        window.sort_by_key(|entry| entry.timestamp);
        let excess = window.len().saturating_sub(self.config.max_entries);
        window.drain(..excess);
        window
    }

    fn detect_anomalies(&self, window: &[&LogEntry]) -> Vec<LogAnomaly> {
        let Some(last) = window.last() else {
            return Vec::new();
        };
        let errors = window.iter().filter(|entry| entry.is_error()).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = errors as f64 / window.len() as f64;
        if ratio <= self.config.anomaly_threshold {
            return Vec::new();
        }
        vec![LogAnomaly {
            kind: HIGH_ERROR_RATE.to_string(),
            description: format!("High error rate detected: {:.2}%", ratio * 100.0),
            score: ratio,
            timestamp: last.timestamp,
        }]
    }

    fn find_patterns(&self, window: &[&LogEntry]) -> Vec<LogPattern> {
        let mut groups: HashMap<String, usize> = HashMap::new();
        for entry in window {
            *groups.entry(self.normalize(&entry.message)).or_default() += 1;
        }

        let mut patterns: Vec<LogPattern> = groups
            .into_iter()
            .filter(|(_, frequency)| *frequency > 1)
            .map(|(pattern, frequency)| {
                #[allow(clippy::cast_precision_loss)]
                let confidence = (frequency as f64 / 10.0).min(1.0);
                LogPattern {
                    pattern,
                    frequency,
                    confidence,
                }
            })
            .collect();
        patterns.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.pattern.cmp(&b.pattern))
        });
        patterns
    }

    fn find_correlations(&self, window: &[&LogEntry]) -> Vec<LogCorrelation> {
        let mut by_source: BTreeMap<&str, Vec<&LogEntry>> = BTreeMap::new();
        for entry in window {
            by_source.entry(entry.source.as_str()).or_default().push(entry);
        }

        let max_gap = chrono::Duration::from_std(self.config.correlation_window)
            .unwrap_or(chrono::Duration::MAX);
        let mut correlations = Vec::new();

        for (source, entries) in by_source {
            let mut cluster: Vec<&LogEntry> = Vec::new();
            for entry in entries {
                if let Some(prev) = cluster.last() {
                    if entry.timestamp - prev.timestamp > max_gap {
                        self.close_cluster(source, &cluster, &mut correlations);
                        cluster.clear();
                    }
                }
                cluster.push(entry);
            }
            self.close_cluster(source, &cluster, &mut correlations);
        }
        correlations
    }

    fn close_cluster(
        &self,
        source: &str,
        cluster: &[&LogEntry],
        correlations: &mut Vec<LogCorrelation>,
    ) {
        if let [first, .., last] = cluster {
            correlations.push(LogCorrelation {
                source: source.to_string(),
                event_count: cluster.len(),
                first_seen: first.timestamp,
                last_seen: last.timestamp,
                correlation: self.config.correlation_strength,
            });
        }
    }

    /// Lowercase, fold digits, truncate to the prefix length.
    fn normalize(&self, message: &str) -> String {
        message
            .chars()
            .flat_map(char::to_lowercase)
            .map(|c| if c.is_ascii_digit() { '#' } else { c })
            .take(self.config.pattern_prefix_len)
            .collect()
    }
}

fn generate_insights(
    anomalies: &[LogAnomaly],
    patterns: &[LogPattern],
    correlations: &[LogCorrelation],
) -> Vec<String> {
    let mut insights = Vec::new();
    if !anomalies.is_empty() {
        insights.push(format!("Detected {} anomalies in log data", anomalies.len()));
    }
    if !patterns.is_empty() {
        insights.push(format!("Found {} recurring patterns", patterns.len()));
    }
    if !correlations.is_empty() {
        insights.push(format!(
            "Identified {} correlated event groups",
            correlations.len()
        ));
    }
    if anomalies.iter().any(|a| a.kind == HIGH_ERROR_RATE) {
        insights.push("System experiencing elevated error rates".to_string());
    }
    insights
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn entry(secs: i64, level: &str, source: &str, message: &str) -> LogEntry {
        LogEntry::new(at(secs), level, source, message)
    }

    #[test]
    fn test_empty_logs_zero_confidence() {
        let result = LogAnalyzer::with_defaults().analyze(&[]);
        assert_eq!(result.confidence, 0.0);
        assert!(result.insights.is_empty());
    }

    #[test]
    fn test_quiet_logs_base_confidence() {
        let logs = vec![
            entry(0, "INFO", "api", "request served"),
            entry(600, "INFO", "db", "checkpoint done"),
        ];
        let result = LogAnalyzer::with_defaults().analyze(&logs);
        assert_eq!(result.confidence, 0.5);
        assert!(result.anomalies.is_empty());
        assert!(result.patterns.is_empty());
        assert!(result.correlations.is_empty());
    }

    #[test]
    fn test_error_burst_full_confidence() {
        let logs = vec![
            entry(0, "ERROR", "api", "timeout calling db after 3000ms"),
            entry(5, "ERROR", "api", "timeout calling db after 3100ms"),
            entry(9, "INFO", "api", "request served"),
        ];
        let result = LogAnalyzer::with_defaults().analyze(&logs);

        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].kind, HIGH_ERROR_RATE);
        assert_eq!(result.patterns.len(), 1);
        assert_eq!(result.patterns[0].frequency, 2);
        assert_eq!(result.patterns[0].confidence, 0.2);
        assert_eq!(result.correlations.len(), 1);
        assert_eq!(result.correlations[0].event_count, 3);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(
            result.insights,
            vec![
                "Detected 1 anomalies in log data".to_string(),
                "Found 1 recurring patterns".to_string(),
                "Identified 1 correlated event groups".to_string(),
                "System experiencing elevated error rates".to_string(),
            ]
        );
    }

    #[test]
    fn test_error_ratio_at_threshold_is_not_anomalous() {
        let mut logs: Vec<LogEntry> = (0..9)
            .map(|i| entry(i * 1000, "INFO", &format!("s{i}"), &format!("msg {i} unique")))
            .collect();
        logs.push(entry(9000, "ERROR", "s9", "one failure"));
        let result = LogAnalyzer::with_defaults().analyze(&logs);
        assert!(result.anomalies.is_empty());
    }

    #[test]
    fn test_bounded_keeps_newest() {
        let analyzer = LogAnalyzer::new(LogAnalyzerConfig {
            max_entries: 2,
            ..LogAnalyzerConfig::default()
        });
        let logs = vec![
            entry(30, "INFO", "a", "third"),
            entry(10, "ERROR", "a", "first"),
            entry(20, "INFO", "a", "second"),
        ];
        let window = analyzer.bounded(&logs);
        let messages: Vec<&str> = window.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "third"]);
    }

    #[test]
    fn test_correlation_window_splits_clusters() {
        let logs = vec![
            entry(0, "INFO", "api", "a"),
            entry(60, "INFO", "api", "b"),
            entry(1000, "INFO", "api", "c"),
            entry(1010, "INFO", "api", "d"),
            entry(5000, "INFO", "api", "e"),
        ];
        let result = LogAnalyzer::with_defaults().analyze(&logs);
        assert_eq!(result.correlations.len(), 2);
        assert_eq!(result.correlations[0].first_seen, at(0));
        assert_eq!(result.correlations[1].last_seen, at(1010));
    }

    #[test]
    fn test_normalize_folds_digits_and_truncates() {
        let analyzer = LogAnalyzer::with_defaults();
        assert_eq!(analyzer.normalize("Worker 12 DIED"), "worker ## died");
        let long = "x".repeat(80);
        assert_eq!(analyzer.normalize(&long).chars().count(), 50);
    }
}
