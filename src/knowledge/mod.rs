//! Knowledge base.
//!
//! Stores what the engine has learned: one [`HistoricalIncident`] per
//! diagnosed incident, one [`Solution`] per (root cause, strategy) pair
//! with a rolling success rate, and the [`CausalRelationship`]s fed to
//! the root-cause analyzer.
//!
//! [`KnowledgeStore`] is the storage seam. [`KnowledgeBase`] keeps
//! everything in memory; [`SqliteKnowledgeStore`] persists it.

mod sqlite;

pub use sqlite::SqliteKnowledgeStore;

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnosis::DiagnosticResult;
use crate::error::StorageError;
use crate::incident::{duration_millis, SystemIncident};
use crate::recovery::RecoveryResult;

/// A diagnosed incident as remembered by the knowledge base.
///
/// Write-once; only `verified` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalIncident {
    /// Incident ID.
    pub id: String,
    /// Incident type.
    pub incident_type: String,
    /// Summary of the diagnosis.
    pub description: String,
    /// Diagnosed root cause.
    pub root_cause: String,
    /// Diagnosis confidence.
    pub confidence: f64,
    /// Incident symptoms.
    pub symptoms: Vec<String>,
    /// Actions recommended by the diagnosis.
    pub recommended_actions: Vec<String>,
    /// ML feature vector of the incident.
    pub features: Vec<f64>,
    /// Diagnosis wall time.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    /// Diagnosis time.
    pub timestamp: DateTime<Utc>,
    /// Confirmed by an operator review.
    pub verified: bool,
}

impl HistoricalIncident {
    /// Build the record for a diagnosis.
    #[must_use]
    pub fn from_diagnosis(incident: &SystemIncident, result: &DiagnosticResult) -> Self {
        Self {
            id: result.incident_id.clone(),
            incident_type: incident.incident_type.clone(),
            description: format!("Diagnosed as {}", result.root_cause),
            root_cause: result.root_cause.clone(),
            confidence: result.confidence,
            symptoms: incident.symptoms.clone(),
            recommended_actions: result.recommended_actions.clone(),
            features: result.analysis.ml.features.clone(),
            duration: result.duration,
            timestamp: result.timestamp,
            verified: false,
        }
    }
}

/// Running success rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessRate {
    /// Mean of outcomes, 0.0 to 1.0.
    pub rate: f64,
    /// Outcomes recorded.
    pub samples: u64,
}

impl SuccessRate {
    /// Fold one outcome into the running mean.
    pub fn record(&mut self, success: bool) {
        self.samples += 1;
        #[allow(clippy::cast_precision_loss)]
        let n = self.samples as f64;
        let outcome = if success { 1.0 } else { 0.0 };
        self.rate = self.rate * (n - 1.0) / n + outcome / n;
    }
}

/// A remediation and how well it has worked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// `<root_cause>:<strategy>`.
    pub id: String,
    /// Root cause remediated.
    pub root_cause: String,
    /// Recovery strategy applied.
    pub strategy: String,
    /// Rolling success rate.
    pub success_rate: SuccessRate,
    /// Mean step recovery rate.
    pub avg_recovery_rate: f64,
    /// Last time the solution was applied.
    pub last_used: DateTime<Utc>,
}

impl Solution {
    /// Solution ID for a root cause and strategy.
    #[must_use]
    pub fn id_for(root_cause: &str, strategy: &str) -> String {
        format!("{root_cause}:{strategy}")
    }

    /// Create an empty solution.
    #[must_use]
    pub fn new(root_cause: impl Into<String>, strategy: impl Into<String>) -> Self {
        let root_cause = root_cause.into();
        let strategy = strategy.into();
        Self {
            id: Self::id_for(&root_cause, &strategy),
            root_cause,
            strategy,
            success_rate: SuccessRate::default(),
            avg_recovery_rate: 0.0,
            last_used: Utc::now(),
        }
    }

    /// Fold a recovery outcome into the statistics.
    pub fn apply(&mut self, result: &RecoveryResult) {
        self.success_rate.record(result.success);
        #[allow(clippy::cast_precision_loss)]
        let n = self.success_rate.samples as f64;
        self.avg_recovery_rate = self.avg_recovery_rate * (n - 1.0) / n + result.recovery_rate / n;
        self.last_used = result.timestamp;
    }
}

/// A cause/effect edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalRelationship {
    /// Cause.
    pub cause: String,
    /// Effect.
    pub effect: String,
    /// Edge strength, 0.0 to 1.0.
    pub strength: f64,
    /// Confidence in the edge.
    pub confidence: f64,
    /// Supporting evidence.
    pub evidence: Vec<String>,
}

impl CausalRelationship {
    /// Create a new relationship with confidence equal to its strength.
    #[must_use]
    pub fn new(cause: impl Into<String>, effect: impl Into<String>, strength: f64) -> Self {
        let strength = strength.clamp(0.0, 1.0);
        Self {
            cause: cause.into(),
            effect: effect.into(),
            strength,
            confidence: strength,
            evidence: Vec::new(),
        }
    }
}

/// A knowledge base query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnowledgeEntry {
    /// A past incident with the queried root cause.
    Incident(HistoricalIncident),
    /// A solution for the queried root cause.
    Solution(Solution),
}

/// Knowledge store.
///
/// Implementations must be safe to share across the diagnosis engine,
/// the recovery engine, and the learning loop.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Record a diagnosis as a historical incident. Existing records are kept.
    async fn update_from_diagnosis(
        &self,
        incident: &SystemIncident,
        result: &DiagnosticResult,
    ) -> Result<(), StorageError>;

    /// Fold a recovery outcome into the matching solution.
    async fn update_from_recovery(&self, result: &RecoveryResult) -> Result<(), StorageError>;

    /// Incidents and solutions for a root cause. Incidents come first, newest first.
    async fn query(&self, root_cause: &str) -> Result<Vec<KnowledgeEntry>, StorageError>;

    /// Mark a historical incident as verified.
    async fn mark_verified(&self, incident_id: &str) -> Result<(), StorageError>;

    /// All historical incidents.
    async fn incidents(&self) -> Result<Vec<HistoricalIncident>, StorageError>;

    /// Verified historical incidents.
    async fn verified_incidents(&self) -> Result<Vec<HistoricalIncident>, StorageError>;

    /// Look up a solution by ID.
    async fn solution(&self, id: &str) -> Result<Option<Solution>, StorageError>;

    /// Insert or replace a causal relationship.
    async fn record_causal_relationship(
        &self,
        relationship: CausalRelationship,
    ) -> Result<(), StorageError>;

    /// All causal relationships.
    async fn causal_relationships(&self) -> Result<Vec<CausalRelationship>, StorageError>;
}

#[derive(Debug, Default)]
struct KnowledgeData {
    incidents: HashMap<String, HistoricalIncident>,
    solutions: HashMap<String, Solution>,
    relationships: Vec<CausalRelationship>,
}

/// In-memory knowledge base.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    data: RwLock<KnowledgeData>,
}

impl KnowledgeBase {
    /// Create an empty knowledge base.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, KnowledgeData>, StorageError> {
        self.data.read().map_err(|_| lock_poisoned())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, KnowledgeData>, StorageError> {
        self.data.write().map_err(|_| lock_poisoned())
    }
}

fn lock_poisoned() -> StorageError {
    StorageError::Internal {
        message: "knowledge base lock poisoned".into(),
    }
}

#[async_trait]
impl KnowledgeStore for KnowledgeBase {
    async fn update_from_diagnosis(
        &self,
        incident: &SystemIncident,
        result: &DiagnosticResult,
    ) -> Result<(), StorageError> {
        let record = HistoricalIncident::from_diagnosis(incident, result);
        self.write()?
            .incidents
            .entry(record.id.clone())
            .or_insert(record);
        Ok(())
    }

    async fn update_from_recovery(&self, result: &RecoveryResult) -> Result<(), StorageError> {
        let id = Solution::id_for(&result.root_cause, &result.strategy_name);
        self.write()?
            .solutions
            .entry(id)
            .or_insert_with(|| Solution::new(&result.root_cause, &result.strategy_name))
            .apply(result);
        Ok(())
    }

    async fn query(&self, root_cause: &str) -> Result<Vec<KnowledgeEntry>, StorageError> {
        let data = self.read()?;
        let mut incidents: Vec<&HistoricalIncident> = data
            .incidents
            .values()
            .filter(|i| i.root_cause == root_cause)
            .collect();
        incidents.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));

        let mut solutions: Vec<&Solution> = data
            .solutions
            .values()
            .filter(|s| s.root_cause == root_cause)
            .collect();
        solutions.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(incidents
            .into_iter()
            .cloned()
            .map(KnowledgeEntry::Incident)
            .chain(solutions.into_iter().cloned().map(KnowledgeEntry::Solution))
            .collect())
    }

    async fn mark_verified(&self, incident_id: &str) -> Result<(), StorageError> {
        let mut data = self.write()?;
        let record =
            data.incidents
                .get_mut(incident_id)
                .ok_or_else(|| StorageError::IncidentNotFound {
                    incident_id: incident_id.to_string(),
                })?;
        record.verified = true;
        Ok(())
    }

    async fn incidents(&self) -> Result<Vec<HistoricalIncident>, StorageError> {
        let mut all: Vec<HistoricalIncident> = self.read()?.incidents.values().cloned().collect();
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn verified_incidents(&self) -> Result<Vec<HistoricalIncident>, StorageError> {
        Ok(self
            .incidents()
            .await?
            .into_iter()
            .filter(|i| i.verified)
            .collect())
    }

    async fn solution(&self, id: &str) -> Result<Option<Solution>, StorageError> {
        Ok(self.read()?.solutions.get(id).cloned())
    }

    async fn record_causal_relationship(
        &self,
        relationship: CausalRelationship,
    ) -> Result<(), StorageError> {
        let mut data = self.write()?;
        if let Some(existing) = data
            .relationships
            .iter_mut()
            .find(|r| r.cause == relationship.cause && r.effect == relationship.effect)
        {
            *existing = relationship;
        } else {
            data.relationships.push(relationship);
        }
        Ok(())
    }

    async fn causal_relationships(&self) -> Result<Vec<CausalRelationship>, StorageError> {
        Ok(self.read()?.relationships.clone())
    }
}
