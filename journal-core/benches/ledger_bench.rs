//! Criterion benchmarks for ledger hot paths.
//!
//! Benchmarks:
//! 1. Backfill reconcile over a business-day range (in-memory sources)
//! 2. Gap-fill carry-forward over a sparse ledger
//! 3. Full-table render
//! 4. Ledger parse from CSV bytes

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use journal_core::data::{MemorySource, SourceRegistry};
use journal_core::reconcile::business_days;
use journal_core::repair::{gap_fill, GapFillOptions};
use journal_core::store::render;
use journal_core::{
    Cell, FallbackResolver, Ledger, LedgerStore, ObservationRow, ObservationSchema,
    ReconcileEngine, ReconcileMode,
};
use rust_decimal::Decimal;

// ── Helpers ──────────────────────────────────────────────────────────

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()
}

fn dates(n: usize) -> Vec<NaiveDate> {
    let end = base_date()
        .checked_add_days(Days::new(n as u64 * 7 / 5 + 7))
        .unwrap();
    business_days(base_date(), end).into_iter().take(n).collect()
}

fn price(i: usize, field: usize) -> Decimal {
    let v = 100.0 + (field as f64 * 10.0) + (i as f64 * 0.1).sin() * 10.0;
    Decimal::from_f64_retain(v).unwrap_or_default().round_dp(4)
}

/// Yahoo answers every ticker on every day; FRED publishes monthly.
fn make_resolver(days: &[NaiveDate], schema: &ObservationSchema) -> FallbackResolver {
    let mut yahoo = MemorySource::new("yahoo");
    let mut fred = MemorySource::new("fred");
    for (i, &date) in days.iter().enumerate() {
        for (fi, field) in schema.fields().iter().enumerate() {
            for step in &field.chain {
                match step.source() {
                    "yahoo" => yahoo = yahoo.with_point(step.id(), date, price(i, fi)),
                    "fred" if i % 21 == 0 => {
                        fred = fred.with_observation(step.id(), date, price(i, fi) / Decimal::from(50))
                    }
                    _ => {}
                }
            }
        }
    }
    let mut reg = SourceRegistry::new();
    reg.register(Arc::new(yahoo))
        .register(Arc::new(fred))
        .register(Arc::new(MemorySource::new("eodhd")));
    FallbackResolver::new(reg)
}

/// Every third cell empty.
fn make_sparse_ledger(days: &[NaiveDate], schema: &ObservationSchema) -> Ledger {
    let mut ledger = Ledger::new(schema);
    for (i, &date) in days.iter().enumerate() {
        let mut row = ObservationRow::empty(date, schema.len());
        for id in schema.ids() {
            if (i + id.0) % 3 != 0 {
                row.set(id, Cell::Value(price(i, id.0)));
            }
        }
        ledger.upsert(row);
    }
    ledger
}

// ── 1. Reconcile ─────────────────────────────────────────────────────

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    let schema = ObservationSchema::market_journal();

    for n in [250usize, 1260] {
        let days = dates(n);
        let resolver = make_resolver(&days, &schema);
        group.bench_with_input(BenchmarkId::new("backfill", n), &days, |b, days| {
            b.iter(|| {
                let mut ledger = Ledger::new(&schema);
                let engine = ReconcileEngine::new(&schema, &resolver);
                let report = engine.reconcile(&mut ledger, days, ReconcileMode::WriteOnce);
                black_box(report.added.len())
            })
        });
    }

    let days = dates(1260);
    let resolver = make_resolver(&days, &schema);
    let mut full = Ledger::new(&schema);
    ReconcileEngine::new(&schema, &resolver).reconcile(&mut full, &days, ReconcileMode::WriteOnce);
    group.bench_function("noop_rerun_1260", |b| {
        b.iter(|| {
            let mut ledger = full.clone();
            let engine = ReconcileEngine::new(&schema, &resolver);
            black_box(engine.reconcile(&mut ledger, &days, ReconcileMode::WriteOnce))
        })
    });

    group.finish();
}

// ── 2. Gap-fill ──────────────────────────────────────────────────────

fn bench_gap_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("gap_fill");
    let schema = ObservationSchema::market_journal();
    let days = dates(1260);
    let sparse = make_sparse_ledger(&days, &schema);
    let resolver = FallbackResolver::new(SourceRegistry::disabled(["yahoo", "fred", "eodhd"]));
    let opts = GapFillOptions {
        fields: schema.ids().collect(),
        carry_forward_only: true,
        ..GapFillOptions::default()
    };

    group.bench_function("carry_forward_1260_rows", |b| {
        b.iter(|| {
            let mut ledger = sparse.clone();
            black_box(gap_fill(&mut ledger, &schema, &resolver, &opts).changes.len())
        })
    });

    group.finish();
}

// ── 3/4. Store ───────────────────────────────────────────────────────

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    let schema = ObservationSchema::market_journal();
    let ledger = make_sparse_ledger(&dates(1260), &schema);

    group.bench_function("render_1260_rows", |b| {
        b.iter(|| black_box(render(&ledger, &schema).unwrap().len()))
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.csv");
    std::fs::write(&path, render(&ledger, &schema).unwrap()).unwrap();
    group.bench_function("load_1260_rows", |b| {
        b.iter(|| {
            let mut store = LedgerStore::new(&path);
            black_box(store.load(&schema).unwrap().len())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_reconcile, bench_gap_fill, bench_store);
criterion_main!(benches);
