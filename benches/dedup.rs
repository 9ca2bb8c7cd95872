//! Benchmarks for the dedup hot path.
//!
//! Benchmark targets:
//! - Fingerprint computation: <5us
//! - `should_process` on a warm cache of 10,000 verdicts: <100us
//! - System-message classification: <5us

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{DateTime, Duration as TimeDelta, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;

use tallybook::services::MessageHasher;
use tallybook::{
    CsvExportBackend, DedupCoordinator, PatternClassifier, SqliteCacheBackend,
    SystemMessageClassifier,
};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 8, 0, 0).unwrap()
}

/// Creates a coordinator with `count` cached verdicts.
fn warm_coordinator(dir: &TempDir, count: i64) -> DedupCoordinator {
    let cache = SqliteCacheBackend::new(dir.path().join("bench.cache.db")).unwrap();
    let export = CsvExportBackend::new(dir.path().join("bench.csv")).unwrap();
    let coordinator = DedupCoordinator::new(Arc::new(cache), Arc::new(export));
    for i in 0..count {
        coordinator.cache_message_result(
            &format!("{i} gasto"),
            base() + TimeDelta::minutes(i),
            None,
        );
    }
    coordinator
}

fn bench_fingerprint(c: &mut Criterion) {
    c.bench_function("fingerprint", |b| {
        b.iter(|| MessageHasher::fingerprint(black_box("  250   Carnicería  "), black_box(base())));
    });
}

fn bench_classifier(c: &mut Criterion) {
    let classifier = PatternClassifier::default();
    let mut group = c.benchmark_group("classifier");

    group.bench_function("regular", |b| {
        b.iter(|| classifier.is_system_message(black_box("500 pizza con amigos")));
    });
    group.bench_function("system", |b| {
        b.iter(|| {
            classifier.is_system_message(black_box(
                "Los mensajes y las llamadas están cifrados de extremo a extremo",
            ))
        });
    });
    group.finish();
}

fn bench_should_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("should_process");

    for size in [100i64, 1_000, 10_000] {
        let dir = TempDir::new().unwrap();
        let coordinator = warm_coordinator(&dir, size);
        let known = format!("{} gasto", size / 2);
        let known_at = base() + TimeDelta::minutes(size / 2);

        group.bench_with_input(BenchmarkId::new("hit", size), &size, |b, _| {
            b.iter(|| coordinator.should_process(black_box(&known), black_box(known_at)));
        });
        group.bench_with_input(BenchmarkId::new("miss", size), &size, |b, _| {
            b.iter(|| coordinator.should_process(black_box("nuevo gasto"), black_box(base())));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_classifier, bench_should_process);
criterion_main!(benches);
