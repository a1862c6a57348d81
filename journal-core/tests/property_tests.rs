//! Property tests for ledger invariants.
//!
//! Uses proptest to verify:
//! 1. Fixed precision: every rendered value carries exactly the field's digits
//! 2. No regression: reconciling never clears or changes a filled cell
//! 3. Idempotent repair: a second precision pass is a no-op
//! 4. Ordered history: carry-forward never looks at a later date

use chrono::{Days, NaiveDate};
use journal_core::cell::{format_fixed, quantize};
use journal_core::data::{MemorySource, SourceRegistry};
use journal_core::repair::normalize_precision;
use journal_core::{
    Cell, FallbackResolver, Ledger, ObservationRow, ObservationSchema, ReconcileEngine,
    ReconcileMode,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_decimal() -> impl Strategy<Value = Decimal> {
    (-1_000_000_000_000i64..1_000_000_000_000i64, 0u32..10).prop_map(|(m, s)| Decimal::new(m, s))
}

fn arb_cell() -> impl Strategy<Value = Option<Decimal>> {
    prop::option::weighted(0.6, arb_decimal())
}

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
}

fn day(offset: u64) -> NaiveDate {
    base().checked_add_days(Days::new(offset)).unwrap()
}

/// GOLD column per day offset; offsets may repeat, last write wins.
fn ledger_from(schema: &ObservationSchema, cells: &[(u64, Option<Decimal>)]) -> Ledger {
    let gold = schema.find("GOLD").unwrap();
    let mut ledger = Ledger::new(schema);
    for &(offset, v) in cells {
        let mut row = ObservationRow::empty(day(offset), schema.len());
        row.set(gold, Cell::from(v));
        ledger.upsert(row);
    }
    ledger
}

fn resolver_with_gold(points: &[(u64, Decimal)]) -> FallbackResolver {
    let mut yahoo = MemorySource::new("yahoo");
    for &(offset, v) in points {
        yahoo = yahoo.with_point("GC=F", day(offset), v);
    }
    let mut reg = SourceRegistry::new();
    reg.register(Arc::new(yahoo))
        .register(Arc::new(MemorySource::new("eodhd")))
        .register(Arc::new(MemorySource::new("fred")));
    FallbackResolver::new(reg)
}

// ── 1. Fixed precision ───────────────────────────────────────────────

proptest! {
    #[test]
    fn rendered_value_has_exact_precision(v in arb_decimal(), p in 0u32..9) {
        let s = format_fixed(v, p);
        let frac = s.split_once('.').map(|(_, f)| f.len()).unwrap_or(0);
        prop_assert_eq!(frac as u32, p);
    }

    #[test]
    fn quantize_is_idempotent(v in arb_decimal(), p in 0u32..9) {
        let once = quantize(v, p);
        prop_assert_eq!(quantize(once, p), once);
        prop_assert_eq!(once.scale(), p);
    }
}

// ── 2. No regression ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn reconcile_never_changes_a_filled_cell(
        cells in prop::collection::vec((0u64..30, arb_cell()), 1..20),
        points in prop::collection::vec((0u64..30, arb_decimal()), 0..20),
        targets in prop::collection::vec(0u64..30, 1..10),
        refresh in any::<bool>(),
    ) {
        let schema = ObservationSchema::market_journal();
        let gold = schema.find("GOLD").unwrap();
        let mut ledger = ledger_from(&schema, &cells);
        let before = ledger.clone();

        let resolver = resolver_with_gold(&points);
        let mode = if refresh { ReconcileMode::Refresh } else { ReconcileMode::WriteOnce };
        let dates: Vec<NaiveDate> = targets.iter().map(|&o| day(o)).collect();
        ReconcileEngine::new(&schema, &resolver).reconcile(&mut ledger, &dates, mode);

        for row in before.rows() {
            if row.cell(gold).is_present() {
                let after = ledger.get(row.date).unwrap();
                prop_assert!(after.cell(gold).is_present());
                if mode == ReconcileMode::WriteOnce {
                    prop_assert_eq!(after.value(gold), row.value(gold));
                }
            }
        }
        // no stored row is ever dropped
        for row in before.rows() {
            prop_assert!(ledger.contains(row.date));
        }
    }

    #[test]
    fn reconcile_is_idempotent(
        cells in prop::collection::vec((0u64..30, arb_cell()), 0..20),
        points in prop::collection::vec((0u64..30, arb_decimal()), 0..20),
        targets in prop::collection::vec(0u64..30, 1..10),
    ) {
        let schema = ObservationSchema::market_journal();
        let mut ledger = ledger_from(&schema, &cells);
        let resolver = resolver_with_gold(&points);
        let dates: Vec<NaiveDate> = targets.iter().map(|&o| day(o)).collect();
        let engine = ReconcileEngine::new(&schema, &resolver);

        engine.reconcile(&mut ledger, &dates, ReconcileMode::WriteOnce);
        let once = ledger.clone();
        let second = engine.reconcile(&mut ledger, &dates, ReconcileMode::WriteOnce);

        prop_assert_eq!(&ledger, &once);
        prop_assert_eq!(second.mutation_count(), 0);
    }
}

// ── 3. Idempotent repair ─────────────────────────────────────────────

proptest! {
    #[test]
    fn precision_pass_twice_is_a_noop(
        cells in prop::collection::vec((0u64..60, arb_cell()), 0..30),
    ) {
        let schema = ObservationSchema::market_journal();
        let mut ledger = ledger_from(&schema, &cells);
        let all: Vec<_> = schema.ids().collect();

        normalize_precision(&mut ledger, &schema, &all);
        let once = ledger.clone();
        let second = normalize_precision(&mut ledger, &schema, &all);

        prop_assert_eq!(second.mutation_count(), 0);
        prop_assert_eq!(&ledger, &once);
    }
}

// ── 4. Ordered history ───────────────────────────────────────────────

proptest! {
    #[test]
    fn last_known_is_strictly_before_target(
        cells in prop::collection::vec((0u64..60, arb_cell()), 0..30),
        target in 0u64..60,
    ) {
        let schema = ObservationSchema::market_journal();
        let gold = schema.find("GOLD").unwrap();
        let ledger = ledger_from(&schema, &cells);
        let date = day(target);

        match ledger.last_known_before(gold, date) {
            Some(lk) => {
                prop_assert!(lk.date < date);
                // nothing filled between the hit and the target
                for row in ledger.rows() {
                    if row.date > lk.date && row.date < date {
                        prop_assert!(!row.cell(gold).is_present());
                    }
                }
            }
            None => {
                for row in ledger.rows() {
                    if row.date < date {
                        prop_assert!(!row.cell(gold).is_present());
                    }
                }
            }
        }
    }
}
