//! Aggregation fold benchmarks.
//!
//! The fold runs on every stats request, over at most one window of rows.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use missionpulse_core::aggregate::{fold_rows, SummarySpec};
use missionpulse_core::Record;
use serde_json::json;
use std::hint::black_box;

const PHASES: [&str; 5] = ["qualify", "capture", "propose", "negotiate", "awarded"];

/// Builds opportunity rows with a mix of present, null and textual values.
fn opportunity_rows(count: usize) -> Vec<Record> {
    (0..count)
        .filter_map(|i| {
            let value = match i % 4 {
                0 => json!(null),
                1 => json!(format!("{}", i * 1000)),
                _ => json!(i * 2500),
            };
            Record::from_row(json!({
                "id": format!("opp-{}", i),
                "title": format!("Opportunity {}", i),
                "phase": if i % 7 == 0 { json!(null) } else { json!(PHASES[i % PHASES.len()]) },
                "estimated_value": value,
                "pwin": (i % 100) as u64,
            }))
        })
        .collect()
}

fn benchmark_fold_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold_rows");
    for window in [50usize, 200, 500] {
        let rows = opportunity_rows(window);
        let spec = SummarySpec::pipeline(window);
        group.bench_with_input(BenchmarkId::from_parameter(window), &rows, |b, rows| {
            b.iter(|| black_box(fold_rows(black_box(rows), &spec)))
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_fold_window);
criterion_main!(benches);
