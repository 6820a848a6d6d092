//! Self-Healing Diagnosis & Recovery Engine
//!
//! Diagnoses system incidents from metrics, logs, events and symptoms, then
//! drives automated recovery with rollback, learning from every outcome.
//!
//! # Features
//!
//! - Four analyzers run in parallel and are fused into one diagnosis
//! - Prioritized recovery strategies with step retries and rollback
//! - Bounded recovery concurrency, one operation per incident
//! - Knowledge base of incidents, solutions and causal relationships
//!   (in memory or `SQLite`)
//! - Periodic learning loop retraining the classifier and causal model
//!
//! # Quick Start
//!
//! ```bash
//! echo '{"id":"inc-1","type":"performance","severity":"high",
//!        "metrics":{"cpu_utilization":0.95}}' | ./self-healing
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   diagnose    ┌──────────────────┐
//! │   Incident   │──────────────▶│ Diagnosis Engine │◀─── learning loop
//! └──────────────┘               └────────┬─────────┘
//!                                         │ DiagnosticResult
//!                                         ▼
//!                                ┌──────────────────┐
//!                                │ Recovery Engine  │───▶ ActionExecutor
//!                                └────────┬─────────┘
//!                                         │ RecoveryResult
//!                                         ▼
//!                                   Knowledge Base
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod diagnosis;
pub mod error;
pub mod incident;
pub mod knowledge;
pub mod recovery;
pub mod system;

mod signal;

#[cfg(test)]
mod test_utils;

pub use system::{HealingOutcome, RecoveryDecision, SelfHealingSystem, SystemHandle};
