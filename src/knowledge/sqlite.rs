//! `SQLite` knowledge store.

#![allow(clippy::missing_errors_doc)]

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use tracing::debug;

use super::{
    CausalRelationship, HistoricalIncident, KnowledgeEntry, KnowledgeStore, Solution, SuccessRate,
};
use crate::diagnosis::DiagnosticResult;
use crate::error::StorageError;
use crate::incident::SystemIncident;
use crate::recovery::RecoveryResult;

const INCIDENT_COLUMNS: &str = "id, incident_type, description, root_cause, confidence, symptoms, \
     recommended_actions, features, duration_ms, timestamp, verified";

const SOLUTION_COLUMNS: &str =
    "id, root_cause, strategy, success_rate, samples, avg_recovery_rate, last_used";

/// `SQLite`-backed [`KnowledgeStore`].
#[derive(Debug, Clone)]
pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
}

impl SqliteKnowledgeStore {
    /// Open (or create) a knowledge database file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ConnectionFailed`] if the connection fails.
    pub async fn new(database_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = database_path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::ConnectionFailed {
                message: format!("Failed to create database directory: {e}"),
            })?;
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path.display()))
                .map_err(|e| StorageError::ConnectionFailed {
                    message: format!("Invalid database path: {e}"),
                })?
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                message: format!("Failed to connect to database: {e}"),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        debug!(path = %path.display(), "Opened knowledge database");
        Ok(store)
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ConnectionFailed`] if the connection fails.
    pub async fn new_in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::ConnectionFailed {
                message: format!("Invalid memory database options: {e}"),
            }
        })?;

        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed {
                message: format!("Failed to create in-memory database: {e}"),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema_001 = include_str!("../../migrations/001_knowledge_schema.sql");
        sqlx::query(schema_001)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationFailed {
                version: "001".to_string(),
                message: format!("Failed to run migration 001: {e}"),
            })?;
        Ok(())
    }

    fn query_error(query: &str, e: &sqlx::Error) -> StorageError {
        StorageError::QueryFailed {
            query: query.to_string(),
            message: e.to_string(),
        }
    }

    fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
        s.parse::<DateTime<Utc>>()
            .map_err(|e| StorageError::Internal {
                message: format!("Failed to parse datetime '{s}': {e}"),
            })
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
        serde_json::to_string(value).map_err(|e| StorageError::Serialization {
            message: e.to_string(),
        })
    }

    fn from_json<T: DeserializeOwned>(s: &str) -> Result<T, StorageError> {
        serde_json::from_str(s).map_err(|e| StorageError::Serialization {
            message: e.to_string(),
        })
    }

    fn row_to_incident(row: &SqliteRow) -> Result<HistoricalIncident, StorageError> {
        let duration_ms: i64 = row.get("duration_ms");
        let timestamp: String = row.get("timestamp");
        let symptoms: String = row.get("symptoms");
        let actions: String = row.get("recommended_actions");
        let features: String = row.get("features");

        Ok(HistoricalIncident {
            id: row.get("id"),
            incident_type: row.get("incident_type"),
            description: row.get("description"),
            root_cause: row.get("root_cause"),
            confidence: row.get("confidence"),
            symptoms: Self::from_json(&symptoms)?,
            recommended_actions: Self::from_json(&actions)?,
            features: Self::from_json(&features)?,
            duration: Duration::from_millis(u64::try_from(duration_ms).unwrap_or(0)),
            timestamp: Self::parse_datetime(&timestamp)?,
            verified: row.get("verified"),
        })
    }

    fn row_to_solution(row: &SqliteRow) -> Result<Solution, StorageError> {
        let samples: i64 = row.get("samples");
        let last_used: String = row.get("last_used");

        Ok(Solution {
            id: row.get("id"),
            root_cause: row.get("root_cause"),
            strategy: row.get("strategy"),
            success_rate: SuccessRate {
                rate: row.get("success_rate"),
                samples: u64::try_from(samples).unwrap_or(0),
            },
            avg_recovery_rate: row.get("avg_recovery_rate"),
            last_used: Self::parse_datetime(&last_used)?,
        })
    }

    fn row_to_relationship(row: &SqliteRow) -> Result<CausalRelationship, StorageError> {
        let evidence: String = row.get("evidence");
        Ok(CausalRelationship {
            cause: row.get("cause"),
            effect: row.get("effect"),
            strength: row.get("strength"),
            confidence: row.get("confidence"),
            evidence: Self::from_json(&evidence)?,
        })
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn update_from_diagnosis(
        &self,
        incident: &SystemIncident,
        result: &DiagnosticResult,
    ) -> Result<(), StorageError> {
        let record = HistoricalIncident::from_diagnosis(incident, result);
        let duration_ms = i64::try_from(record.duration.as_millis()).unwrap_or(i64::MAX);

        sqlx::query(&format!(
            "INSERT OR IGNORE INTO historical_incidents ({INCIDENT_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&record.id)
        .bind(&record.incident_type)
        .bind(&record.description)
        .bind(&record.root_cause)
        .bind(record.confidence)
        .bind(Self::to_json(&record.symptoms)?)
        .bind(Self::to_json(&record.recommended_actions)?)
        .bind(Self::to_json(&record.features)?)
        .bind(duration_ms)
        .bind(record.timestamp.to_rfc3339())
        .bind(record.verified)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::query_error("INSERT historical_incidents", &e))?;

        Ok(())
    }

    async fn update_from_recovery(&self, result: &RecoveryResult) -> Result<(), StorageError> {
        let id = Solution::id_for(&result.root_cause, &result.strategy_name);
        let outcome = if result.success { 1.0 } else { 0.0 };

        // Running means folded in one statement; SET expressions see the old row.
        sqlx::query(
            "INSERT INTO solutions \
             (id, root_cause, strategy, success_rate, samples, avg_recovery_rate, last_used) \
             VALUES (?, ?, ?, ?, 1, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             success_rate = (success_rate * samples + excluded.success_rate) / (samples + 1), \
             avg_recovery_rate = (avg_recovery_rate * samples + excluded.avg_recovery_rate) / (samples + 1), \
             samples = samples + 1, \
             last_used = excluded.last_used",
        )
        .bind(&id)
        .bind(&result.root_cause)
        .bind(&result.strategy_name)
        .bind(outcome)
        .bind(result.recovery_rate)
        .bind(result.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::query_error("UPSERT solutions", &e))?;

        Ok(())
    }

    async fn query(&self, root_cause: &str) -> Result<Vec<KnowledgeEntry>, StorageError> {
        let incident_rows = sqlx::query(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM historical_incidents \
             WHERE root_cause = ? ORDER BY timestamp DESC, id ASC"
        ))
        .bind(root_cause)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::query_error("SELECT historical_incidents", &e))?;

        let solution_rows = sqlx::query(&format!(
            "SELECT {SOLUTION_COLUMNS} FROM solutions WHERE root_cause = ? ORDER BY id ASC"
        ))
        .bind(root_cause)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::query_error("SELECT solutions", &e))?;

        let mut entries = Vec::with_capacity(incident_rows.len() + solution_rows.len());
        for row in &incident_rows {
            entries.push(KnowledgeEntry::Incident(Self::row_to_incident(row)?));
        }
        for row in &solution_rows {
            entries.push(KnowledgeEntry::Solution(Self::row_to_solution(row)?));
        }
        Ok(entries)
    }

    async fn mark_verified(&self, incident_id: &str) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE historical_incidents SET verified = 1 WHERE id = ?")
            .bind(incident_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::query_error("UPDATE historical_incidents", &e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::IncidentNotFound {
                incident_id: incident_id.to_string(),
            });
        }
        Ok(())
    }

    async fn incidents(&self) -> Result<Vec<HistoricalIncident>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM historical_incidents ORDER BY timestamp ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::query_error("SELECT historical_incidents", &e))?;

        rows.iter().map(Self::row_to_incident).collect()
    }

    async fn verified_incidents(&self) -> Result<Vec<HistoricalIncident>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM historical_incidents \
             WHERE verified = 1 ORDER BY timestamp ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::query_error("SELECT historical_incidents", &e))?;

        rows.iter().map(Self::row_to_incident).collect()
    }

    async fn solution(&self, id: &str) -> Result<Option<Solution>, StorageError> {
        let row = sqlx::query(&format!("SELECT {SOLUTION_COLUMNS} FROM solutions WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::query_error("SELECT solutions", &e))?;

        row.as_ref().map(Self::row_to_solution).transpose()
    }

    async fn record_causal_relationship(
        &self,
        relationship: CausalRelationship,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO causal_relationships (cause, effect, strength, confidence, evidence) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(cause, effect) DO UPDATE SET \
             strength = excluded.strength, \
             confidence = excluded.confidence, \
             evidence = excluded.evidence",
        )
        .bind(&relationship.cause)
        .bind(&relationship.effect)
        .bind(relationship.strength)
        .bind(relationship.confidence)
        .bind(Self::to_json(&relationship.evidence)?)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::query_error("UPSERT causal_relationships", &e))?;

        Ok(())
    }

    async fn causal_relationships(&self) -> Result<Vec<CausalRelationship>, StorageError> {
        let rows = sqlx::query(
            "SELECT cause, effect, strength, confidence, evidence \
             FROM causal_relationships ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::query_error("SELECT causal_relationships", &e))?;

        rows.iter().map(Self::row_to_relationship).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_diagnosis, create_test_incident, create_test_recovery_result};
    use pretty_assertions::assert_eq;
    use serial_test::serial;

    async fn test_store() -> SqliteKnowledgeStore {
        SqliteKnowledgeStore::new_in_memory()
            .await
            .expect("Failed to create test store")
    }

    #[tokio::test]
    #[serial]
    async fn test_incident_round_trip_and_write_once() {
        let store = test_store().await;
        let incident = create_test_incident("inc-1").with_symptom("high cpu usage sustained");
        let diagnosis = create_test_diagnosis("inc-1", "cpu_exhaustion", 0.9);
        store.update_from_diagnosis(&incident, &diagnosis).await.unwrap();
        store
            .update_from_diagnosis(&incident, &create_test_diagnosis("inc-1", "disk_exhaustion", 0.4))
            .await
            .unwrap();

        let all = store.incidents().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], HistoricalIncident::from_diagnosis(&incident, &diagnosis));
    }

    #[tokio::test]
    #[serial]
    async fn test_mark_verified_missing_incident() {
        let store = test_store().await;
        let err = store.mark_verified("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::IncidentNotFound { .. }));
    }

    #[tokio::test]
    #[serial]
    async fn test_solution_running_mean() {
        let store = test_store().await;
        store
            .update_from_recovery(&create_test_recovery_result("disk_exhaustion", "disk_cleanup", 2, 0))
            .await
            .unwrap();
        store
            .update_from_recovery(&create_test_recovery_result("disk_exhaustion", "disk_cleanup", 0, 2))
            .await
            .unwrap();

        let solution = store
            .solution("disk_exhaustion:disk_cleanup")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(solution.success_rate.samples, 2);
        assert!((solution.success_rate.rate - 0.5).abs() < 1e-9);
        assert!((solution.avg_recovery_rate - 0.5).abs() < 1e-9);
        assert!(store.solution("other").await.unwrap().is_none());
    }

    #[tokio::test]
    #[serial]
    async fn test_causal_relationships_keep_insertion_order() {
        let store = test_store().await;
        store
            .record_causal_relationship(CausalRelationship::new("x", "y", 0.3))
            .await
            .unwrap();
        store
            .record_causal_relationship(CausalRelationship::new("a", "b", 0.4))
            .await
            .unwrap();
        store
            .record_causal_relationship(CausalRelationship::new("x", "y", 0.9))
            .await
            .unwrap();

        let edges = store.causal_relationships().await.unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].cause, "x");
        assert_eq!(edges[0].strength, 0.9);
        assert_eq!(edges[1].cause, "a");
    }
}
