//! # Telemetry-Anchor Benchmarks
//!
//! | Path | Expectation |
//! |------|-------------|
//! | Canonicalize + SHA-256 | linear in readings per window |
//! | Full run, in-memory stores | dominated by canonicalization for large windows |

use std::sync::Arc;
use std::time::Duration;

use anchor_pipeline::adapters::{
    InMemoryAuditStore, InMemoryEventStore, InMemorySensorStore, ScriptedLedger,
};
use anchor_pipeline::{
    canonicalize, AnchorPipeline, AnchorPipelineApi, PipelineConfig, PipelineDependencies,
};
use anchor_tests::fixtures::{event, reading, LOC_A, LOC_B};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shared_types::RawReading;

fn window_readings(count: usize) -> Vec<RawReading> {
    (0..count)
        .map(|i| {
            let location = if i % 2 == 0 { LOC_A } else { LOC_B };
            let time = format!(
                "2024-01-01T00:0{}:{:02}.{:09}Z",
                1 + (i / 60_000) % 4,
                (i / 1000) % 60,
                i % 1000
            );
            reading(
                location,
                &format!("s-{}", i % 16),
                "Bosch",
                &time,
                20.0 + (i % 100) as f64 / 8.0,
                40.0 + (i % 50) as f64 / 4.0,
            )
        })
        .collect()
}

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");
    group.measurement_time(Duration::from_secs(5));

    for size in [10, 100, 1_000, 10_000] {
        let readings = window_readings(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &readings, |b, readings| {
            b.iter(|| black_box(canonicalize(readings).map(|c| c.digest)))
        });
    }
    group.finish();
}

fn bench_pipeline_run(c: &mut Criterion) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => panic!("failed to build runtime: {e}"),
    };

    let mut group = c.benchmark_group("pipeline_run");
    for size in [10, 1_000] {
        let events = Arc::new(InMemoryEventStore::new());
        let sensors = Arc::new(InMemorySensorStore::new());
        events.insert(event("e1", LOC_A, "2024-01-01T00:00:00Z"));
        let current = event("e2", LOC_B, "2024-01-01T00:05:00Z");
        events.insert(current.clone());
        for r in window_readings(size) {
            sensors.insert(r);
        }

        let pipeline = AnchorPipeline::new(
            PipelineDependencies::new(
                events,
                sensors,
                Arc::new(InMemoryAuditStore::new()),
                Arc::new(ScriptedLedger::accepting()),
            ),
            PipelineConfig::default(),
        );

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &current, |b, current| {
            b.iter(|| runtime.block_on(pipeline.run(current)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_canonicalize, bench_pipeline_run);
criterion_main!(benches);
