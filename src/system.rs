//! The self-healing loop: diagnose an incident, then recover from it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::HealingConfig;
use crate::diagnosis::{DiagnosisEngine, DiagnosticResult};
use crate::error::{AppError, RecoveryError};
use crate::incident::SystemIncident;
use crate::knowledge::{KnowledgeBase, KnowledgeStore, SqliteKnowledgeStore};
use crate::recovery::{
    ExecutorRegistry, RecoveryEngine, RecoveryFeedback, RecoveryOperation, StrategyRegistry,
};

/// What happened after diagnosing an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RecoveryDecision {
    /// A recovery operation was scheduled (or was already running).
    Started {
        /// Operation snapshot at scheduling time.
        operation: RecoveryOperation,
    },
    /// Decision confidence was below the recovery gate.
    BelowConfidence {
        /// The configured gate.
        threshold: f64,
    },
    /// No strategy produced a plan; an operator has to step in.
    NoStrategy {
        /// Why recovery was not started.
        reason: String,
    },
}

/// Diagnosis plus the recovery decision for one incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingOutcome {
    /// Incident ID.
    pub incident_id: String,
    /// Fused diagnosis.
    pub diagnosis: DiagnosticResult,
    /// Recovery decision.
    #[serde(flatten)]
    pub decision: RecoveryDecision,
}

impl HealingOutcome {
    /// The scheduled operation, if recovery started.
    #[must_use]
    pub fn operation(&self) -> Option<&RecoveryOperation> {
        match &self.decision {
            RecoveryDecision::Started { operation } => Some(operation),
            _ => None,
        }
    }
}

/// Diagnosis engine, recovery engine and knowledge base wired together.
pub struct SelfHealingSystem {
    config: HealingConfig,
    knowledge: Arc<dyn KnowledgeStore>,
    diagnosis: Arc<DiagnosisEngine>,
    recovery: Arc<RecoveryEngine>,
}

impl std::fmt::Debug for SelfHealingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfHealingSystem")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SelfHealingSystem {
    /// Build a system with the built-in strategies and the logging executor.
    #[must_use]
    pub fn new(config: HealingConfig, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        Self::with_components(
            config,
            knowledge,
            StrategyRegistry::with_defaults(),
            ExecutorRegistry::with_defaults(),
        )
    }

    /// Build a system with custom strategies and executors.
    #[must_use]
    pub fn with_components(
        config: HealingConfig,
        knowledge: Arc<dyn KnowledgeStore>,
        strategies: StrategyRegistry,
        executors: ExecutorRegistry,
    ) -> Self {
        let diagnosis = Arc::new(DiagnosisEngine::new(
            config.diagnosis.clone(),
            Arc::clone(&knowledge),
        ));
        let recovery = Arc::new(
            RecoveryEngine::new(
                config.recovery.clone(),
                strategies,
                executors,
                Arc::clone(&knowledge),
            )
            .with_feedback(Arc::clone(&diagnosis) as Arc<dyn RecoveryFeedback>),
        );
        Self {
            config,
            knowledge,
            diagnosis,
            recovery,
        }
    }

    /// Build a system from configuration, opening the `SQLite` knowledge
    /// store when `database_path` is set.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] if the database cannot be opened.
    pub async fn from_config(config: HealingConfig) -> Result<Self, AppError> {
        let knowledge: Arc<dyn KnowledgeStore> = match &config.database_path {
            Some(path) => {
                info!(database = %path, "Using SQLite knowledge store");
                Arc::new(SqliteKnowledgeStore::new(path).await?)
            }
            None => {
                info!("Using in-memory knowledge base");
                Arc::new(KnowledgeBase::new())
            }
        };
        Ok(Self::new(config, knowledge))
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &HealingConfig {
        &self.config
    }

    /// The diagnosis engine.
    #[must_use]
    pub const fn diagnosis_engine(&self) -> &Arc<DiagnosisEngine> {
        &self.diagnosis
    }

    /// The recovery engine.
    #[must_use]
    pub const fn recovery_engine(&self) -> &Arc<RecoveryEngine> {
        &self.recovery
    }

    /// The knowledge store.
    #[must_use]
    pub fn knowledge(&self) -> &dyn KnowledgeStore {
        self.knowledge.as_ref()
    }

    /// Diagnose an incident and start recovery when its
    /// [`DiagnosticResult::decision_confidence`] reaches the configured
    /// `confidence_threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidIncident`] for an incident without an ID and
    /// [`AppError::Recovery`] if the selected strategy fails to build a plan.
    pub async fn handle_incident(
        &self,
        incident: &SystemIncident,
    ) -> Result<HealingOutcome, AppError> {
        if incident.id.trim().is_empty() {
            return Err(AppError::InvalidIncident {
                message: "incident id must not be empty".into(),
            });
        }

        let diagnosis = self.diagnosis.diagnose(incident).await;
        let threshold = self.config.diagnosis.confidence_threshold;
        let decision_confidence = diagnosis.decision_confidence();

        let decision = if decision_confidence < threshold {
            info!(
                incident_id = %incident.id,
                root_cause = %diagnosis.root_cause,
                confidence = diagnosis.confidence,
                decision_confidence,
                threshold,
                "Diagnosis below confidence threshold, recovery not started"
            );
            RecoveryDecision::BelowConfidence { threshold }
        } else {
            match self.recovery.recover_from_incident(incident, &diagnosis) {
                Ok(operation) => RecoveryDecision::Started { operation },
                Err(e @ RecoveryError::NoApplicableStrategy { .. }) => {
                    warn!(incident_id = %incident.id, error = %e, "Escalating to operator");
                    RecoveryDecision::NoStrategy {
                        reason: e.to_string(),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        Ok(HealingOutcome {
            incident_id: incident.id.clone(),
            diagnosis,
            decision,
        })
    }

    /// Start background work (the learning loop).
    #[must_use]
    pub fn start(&self) -> SystemHandle {
        let (shutdown, rx) = watch::channel(false);
        let learning = self.diagnosis.spawn_learning_loop(rx);
        SystemHandle {
            shutdown,
            learning,
            recovery: Arc::clone(&self.recovery),
        }
    }
}

/// Running background work of a [`SelfHealingSystem`].
#[derive(Debug)]
pub struct SystemHandle {
    shutdown: watch::Sender<bool>,
    learning: JoinHandle<()>,
    recovery: Arc<RecoveryEngine>,
}

impl SystemHandle {
    /// Stop the learning loop and cancel in-flight recoveries.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        self.recovery.shutdown();
        if let Err(e) = self.learning.await {
            warn!(error = %e, "Learning loop ended abnormally");
        }
        info!("Self-healing system stopped");
    }
}
