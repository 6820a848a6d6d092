//! Incident data model.
//!
//! A [`SystemIncident`] is raised by the monitoring pipeline and is
//! immutable once built. Everything the engine knows about a failure
//! arrives through it: the metric snapshot, the log window, and the
//! discrete events observed between `start_time` and `detected_at`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metric snapshot keys understood by feature extraction and rules.
///
/// Missing keys read as `0.0`.
pub mod metric_keys {
    /// CPU utilization, 0.0 to 1.0.
    pub const CPU_UTILIZATION: &str = "cpu_utilization";
    /// Memory utilization, 0.0 to 1.0.
    pub const MEMORY_UTILIZATION: &str = "memory_utilization";
    /// Disk utilization, 0.0 to 1.0.
    pub const DISK_UTILIZATION: &str = "disk_utilization";
    /// Request error rate, 0.0 to 1.0.
    pub const ERROR_RATE: &str = "error_rate";
    /// Response time in seconds.
    pub const RESPONSE_TIME: &str = "response_time";
    /// Requests per second.
    pub const THROUGHPUT: &str = "throughput";
    /// Network utilization, 0.0 to 1.0.
    pub const NETWORK_UTILIZATION: &str = "network_utilization";
    /// Network error rate, 0.0 to 1.0.
    pub const NETWORK_ERROR_RATE: &str = "network_error_rate";
    /// Normalized load average.
    pub const LOAD_AVERAGE: &str = "load_average";
    /// Number of running services.
    pub const ACTIVE_SERVICES: &str = "active_services";
    /// Number of open connections.
    pub const CONNECTION_COUNT: &str = "connection_count";
    /// Memory pressure, 0.0 to 1.0.
    pub const MEMORY_PRESSURE: &str = "memory_pressure";
    /// Disk IO rate, 0.0 to 1.0.
    pub const DISK_IO_RATE: &str = "disk_io_rate";
}

/// Incident severity.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Degraded but serving.
    #[default]
    Low,
    /// Noticeable impact.
    Medium,
    /// Significant impact.
    High,
    /// Outage; escalate to a human.
    Critical,
}

impl Severity {
    /// Numeric score used as an ML feature.
    #[must_use]
    pub const fn score(self) -> f64 {
        match self {
            Self::Critical => 1.0,
            Self::High => 0.8,
            Self::Medium => 0.6,
            Self::Low => 0.4,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// One log line from the incident window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LogEntry {
    /// When the line was written.
    pub timestamp: DateTime<Utc>,
    /// Level as emitted (`INFO`, `WARN`, `ERROR`, `FATAL`, ...).
    pub level: String,
    /// Emitting component.
    pub source: String,
    /// Log message.
    pub message: String,
    /// Node that produced the line.
    #[serde(default)]
    pub node_id: String,
    /// Structured fields.
    #[serde(default)]
    pub fields: HashMap<String, serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        level: impl Into<String>,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            level: level.into(),
            source: source.into(),
            message: message.into(),
            node_id: String::new(),
            fields: HashMap::new(),
        }
    }

    /// True for `ERROR` and `FATAL` lines, case-insensitively.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.level.eq_ignore_ascii_case("error") || self.level.eq_ignore_ascii_case("fatal")
    }
}

/// A discrete event observed during the incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SystemEvent {
    /// Event ID.
    pub id: String,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Emitting component.
    pub source: String,
    /// Human-readable description.
    pub message: String,
    /// Event severity.
    #[serde(default)]
    pub severity: Severity,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
}

impl SystemEvent {
    /// Create a new event.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        source: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            source: source.into(),
            message: message.into(),
            severity: Severity::default(),
            timestamp,
        }
    }
}

/// A detected abnormal system condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SystemIncident {
    /// Incident ID.
    pub id: String,
    /// Incident type as classified by the monitor.
    #[serde(rename = "type", default)]
    pub incident_type: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Severity.
    #[serde(default)]
    pub severity: Severity,
    /// Affected node.
    #[serde(default)]
    pub node_id: String,
    /// Observed symptoms.
    #[serde(default)]
    pub symptoms: Vec<String>,
    /// Metric snapshot, keyed by [`metric_keys`].
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    /// Log window.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Discrete events.
    #[serde(default)]
    pub events: Vec<SystemEvent>,
    /// When the condition started.
    #[serde(default = "Utc::now")]
    pub start_time: DateTime<Utc>,
    /// When the monitor raised the incident.
    #[serde(default = "Utc::now")]
    pub detected_at: DateTime<Utc>,
}

impl SystemIncident {
    /// Create a new incident with no metrics, logs or events.
    #[must_use]
    pub fn new(id: impl Into<String>, incident_type: impl Into<String>, severity: Severity) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            incident_type: incident_type.into(),
            description: String::new(),
            severity,
            node_id: String::new(),
            symptoms: Vec::new(),
            metrics: HashMap::new(),
            logs: Vec::new(),
            events: Vec::new(),
            start_time: now,
            detected_at: now,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the affected node.
    #[must_use]
    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Add a metric value.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Add a symptom.
    #[must_use]
    pub fn with_symptom(mut self, symptom: impl Into<String>) -> Self {
        self.symptoms.push(symptom.into());
        self
    }

    /// Add a log entry.
    #[must_use]
    pub fn with_log(mut self, entry: LogEntry) -> Self {
        self.logs.push(entry);
        self
    }

    /// Add an event.
    #[must_use]
    pub fn with_event(mut self, event: SystemEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Set the start and detection times.
    #[must_use]
    pub fn with_window(mut self, start_time: DateTime<Utc>, detected_at: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self.detected_at = detected_at;
        self
    }

    /// Metric value by key; missing or non-finite values read as `0.0`.
    #[must_use]
    pub fn metric(&self, key: &str) -> f64 {
        self.metrics
            .get(key)
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }
}

/// Serialize `Duration` as whole milliseconds.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serialize as milliseconds.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    /// Deserialize from milliseconds.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// JSON Schema of the incident submission format.
#[must_use]
pub fn incident_schema() -> schemars::Schema {
    schemars::schema_for!(SystemIncident)
}
