// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for snapshotting and fingerprinting.
//!
//! Run with: `cargo bench --bench snapshot`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;

use nbtelemetry::envelope::{assemble, EventName, Identity};
use nbtelemetry::notebook::{Cell, CellOutput, Notebook};
use nbtelemetry::sources::visible_cells;
use nbtelemetry::tracker::{fingerprint, StateTracker};

fn notebook(cells: usize) -> Arc<Notebook> {
    let cells = (0..cells)
        .map(|i| {
            if i % 4 == 3 {
                Cell::markdown(format!("m{i}"), format!("## Section {i}\nSome prose."))
            } else {
                let cell = Cell::code(format!("c{i}"), format!("df = load({i})\ndf.describe()"));
                cell.push_output(CellOutput::result("text/plain", json!(format!("row count {}", i * 10))));
                cell
            }
        })
        .collect();
    Arc::new(Notebook::new("bench.ipynb", cells))
}

/// Full snapshot (first event) versus mostly stubbed snapshot.
fn bench_take_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("take_snapshot");

    for size in [10usize, 100, 500] {
        group.throughput(Throughput::Elements(size as u64));
        let notebook = notebook(size);
        let tracker = StateTracker::new(&notebook);
        let _ = tracker.take_snapshot();

        group.bench_with_input(BenchmarkId::new("unchanged", size), &size, |b, _| {
            b.iter(|| black_box(tracker.take_snapshot()));
        });

        let first = notebook.cell_at(0);
        group.bench_with_input(BenchmarkId::new("one_edit", size), &size, |b, _| {
            b.iter(|| {
                if let Some(ref cell) = first {
                    cell.set_source("df.head()");
                }
                black_box(tracker.take_snapshot())
            });
        });
    }

    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let cell = Cell::code("c", "x");
    for i in 0..20 {
        cell.push_output(CellOutput::stdout(format!("line {i}\n")));
    }

    c.bench_function("fingerprint_20_outputs", |b| {
        b.iter(|| black_box(fingerprint(black_box(&cell))));
    });
}

fn bench_assemble(c: &mut Criterion) {
    let notebook = notebook(100);
    let tracker = StateTracker::new(&notebook);

    c.bench_function("assemble_and_serialize", |b| {
        b.iter(|| {
            let snapshot = tracker.take_snapshot().unwrap();
            let envelope = assemble(
                EventName::SaveNotebook,
                vec![],
                snapshot,
                Identity {
                    user_id: "u".to_string(),
                    notebook_path: "bench.ipynb".to_string(),
                },
            );
            black_box(serde_json::to_vec(&envelope).unwrap())
        });
    });
}

fn bench_visible_cells(c: &mut Criterion) {
    let notebook = notebook(500);
    for (i, cell) in notebook.cells().iter().enumerate() {
        cell.set_extent(nbtelemetry::notebook::Extent::new(i as f64 * 120.0, 120.0));
    }
    notebook.set_viewport_height(900.0);
    notebook.scroll_to(24_000.0);

    c.bench_function("visible_cells_500", |b| {
        b.iter(|| black_box(visible_cells(&notebook)));
    });
}

criterion_group!(
    benches,
    bench_take_snapshot,
    bench_fingerprint,
    bench_assemble,
    bench_visible_cells
);
criterion_main!(benches);
