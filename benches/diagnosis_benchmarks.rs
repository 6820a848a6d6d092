//! Diagnosis benchmarks.
//!
//! Measures the per-incident hot path: feature extraction, the ML
//! classifier, and a full parallel diagnosis.
//!
//! Run: cargo bench -- diagnosis

#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use std::hint::black_box;
use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use self_healing::config::DiagnosisConfig;
use self_healing::diagnosis::{ClassifierConfig, DiagnosisEngine, FeatureExtractor, MlClassifier};
use self_healing::incident::{metric_keys, LogEntry, Severity, SystemIncident};
use self_healing::knowledge::KnowledgeBase;

/// An incident with a full metric snapshot and `logs` log lines.
fn incident(logs: usize) -> SystemIncident {
    let now = Utc::now();
    let mut incident = SystemIncident::new("bench-inc", "performance", Severity::High)
        .with_metric(metric_keys::CPU_UTILIZATION, 0.95)
        .with_metric(metric_keys::MEMORY_UTILIZATION, 0.7)
        .with_metric(metric_keys::ERROR_RATE, 0.08)
        .with_metric(metric_keys::RESPONSE_TIME, 2.5)
        .with_metric(metric_keys::LOAD_AVERAGE, 0.9)
        .with_symptom("high cpu usage sustained")
        .with_symptom("slow response times");
    for i in 0..logs {
        let level = if i % 4 == 0 { "ERROR" } else { "INFO" };
        let offset = Duration::milliseconds(i64::try_from(i).unwrap() * 250);
        incident = incident.with_log(LogEntry::new(
            now - offset,
            level,
            "inference-service",
            format!("request {} took too long", i % 10),
        ));
    }
    incident
}

fn bench_feature_extraction(c: &mut Criterion) {
    let extractor = FeatureExtractor::new();
    let incident = incident(100);

    c.bench_function("feature_extraction", |b| {
        b.iter(|| black_box(extractor.extract(black_box(&incident))));
    });
}

fn bench_ml_predict(c: &mut Criterion) {
    let classifier = MlClassifier::new(ClassifierConfig::default());
    let incident = incident(0);

    c.bench_function("ml_predict", |b| {
        b.iter(|| black_box(classifier.predict(black_box(&incident)).unwrap()));
    });
}

fn bench_diagnose(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let engine = DiagnosisEngine::new(DiagnosisConfig::default(), Arc::new(KnowledgeBase::new()));

    let mut group = c.benchmark_group("diagnose");
    for logs in [0, 100, 1000] {
        let incident = incident(logs);
        group.bench_with_input(BenchmarkId::from_parameter(logs), &incident, |b, incident| {
            b.iter(|| black_box(rt.block_on(engine.diagnose(incident))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_feature_extraction, bench_ml_predict, bench_diagnose);
criterion_main!(benches);
