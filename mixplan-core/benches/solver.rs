//! Benchmark of the target-weight solver through a full propagation pass.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mixplan_core::{Cell, EntityKind, Session, UnitMode};

/// A session with `materials` stocks, 4 premixtures, and `compositions`
/// rows, every premixture selected everywhere so the allocation solver
/// has work to do.
fn build_session(materials: usize, compositions: usize) -> Session {
    let mut session = Session::new(UnitMode::WeightPercent).unwrap();
    session
        .set_nrows(EntityKind::SourceMaterial, materials)
        .unwrap();
    session.set_nrows(EntityKind::PreMixture, 4).unwrap();
    session
        .set_nrows(EntityKind::Composition, compositions)
        .unwrap();

    for m in 0..materials {
        session
            .set_cell(
                EntityKind::SourceMaterial,
                m,
                "wt%",
                Cell::number(25.0 + m as f64),
            )
            .unwrap();
    }
    let names: Vec<String> = session.names(EntityKind::SourceMaterial).to_vec();
    for p in 0..4 {
        for name in names.iter().take(3) {
            session
                .set_cell(EntityKind::PreMixture, p, name, Cell::number(5.0))
                .unwrap();
        }
    }
    let premix_names: Vec<String> = session.names(EntityKind::PreMixture).to_vec();
    for c in 0..compositions {
        for name in &names {
            session
                .set_cell(EntityKind::Composition, c, name, Cell::number(2.0))
                .unwrap();
        }
        for name in &premix_names {
            session
                .set_cell(EntityKind::Composition, c, name, Cell::Bool(true))
                .unwrap();
        }
    }
    session
}

fn bench_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver");

    for (materials, compositions) in [(5, 10), (20, 50)] {
        let mut session = build_session(materials, compositions);
        let mut total = 100.0;
        group.bench_function(format!("propagate_{materials}x{compositions}"), |b| {
            b.iter(|| {
                // alternate the batch total so every pass re-solves
                total = if total == 100.0 { 200.0 } else { 100.0 };
                session
                    .set_cell(
                        EntityKind::Composition,
                        0,
                        "TotalWeight",
                        Cell::number(black_box(total)),
                    )
                    .unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_solver);
criterion_main!(benches);
