//! In-memory ledger — date-unique observation rows in file order.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use crate::cell::Cell;
use crate::schema::{FieldId, ObservationSchema};

/// One dated row. `cells[i]` belongs to `FieldId(i)` of the owning schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservationRow {
    pub date: NaiveDate,
    cells: Vec<Cell>,
}

impl ObservationRow {
    /// A row with every field unavailable.
    pub fn empty(date: NaiveDate, width: usize) -> Self {
        Self {
            date,
            cells: vec![Cell::Empty; width],
        }
    }

    pub fn from_cells(date: NaiveDate, cells: Vec<Cell>) -> Self {
        Self { date, cells }
    }

    pub fn cell(&self, field: FieldId) -> &Cell {
        &self.cells[field.0]
    }

    pub fn value(&self, field: FieldId) -> Option<Decimal> {
        self.cells[field.0].value()
    }

    pub fn set(&mut self, field: FieldId, cell: Cell) {
        self.cells[field.0] = cell;
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Every field holds a parsed value.
    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Cell::is_present)
    }

    /// Fields among `fields` whose cell is not a parsed value.
    pub fn missing<'a>(&'a self, fields: &'a [FieldId]) -> impl Iterator<Item = FieldId> + 'a {
        fields.iter().copied().filter(|f| !self.cells[f.0].is_present())
    }
}

/// Carry-forward candidate: the last known value of a field before some date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LastKnown {
    pub date: NaiveDate,
    pub value: Decimal,
}

/// Outcome of [`Ledger::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// Per-field cell census, reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldCoverage {
    pub field: String,
    pub filled: usize,
    pub empty: usize,
    pub malformed: usize,
}

/// Ordered, date-unique sequence of observation rows.
///
/// Row order is file order. Ascending date order is restored by the ordering
/// pass; nothing here depends on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    width: usize,
    rows: Vec<ObservationRow>,
    index: HashMap<NaiveDate, usize>,
}

impl Ledger {
    pub fn new(schema: &ObservationSchema) -> Self {
        Self {
            width: schema.len(),
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build from rows already checked for date uniqueness.
    pub(crate) fn from_rows(width: usize, rows: Vec<ObservationRow>) -> Self {
        let index = rows.iter().enumerate().map(|(i, r)| (r.date, i)).collect();
        Self { width, rows, index }
    }

    /// Number of fields per row.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ObservationRow] {
        &self.rows
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.index.contains_key(&date)
    }

    pub fn get(&self, date: NaiveDate) -> Option<&ObservationRow> {
        self.index.get(&date).map(|&i| &self.rows[i])
    }

    pub fn get_mut(&mut self, date: NaiveDate) -> Option<&mut ObservationRow> {
        match self.index.get(&date) {
            Some(&i) => Some(&mut self.rows[i]),
            None => None,
        }
    }

    /// Replace the row with the same date in place, or append it.
    pub fn upsert(&mut self, row: ObservationRow) -> Upsert {
        debug_assert_eq!(row.cells.len(), self.width);
        match self.index.get(&row.date) {
            Some(&i) => {
                self.rows[i] = row;
                Upsert::Replaced
            }
            None => {
                self.index.insert(row.date, self.rows.len());
                self.rows.push(row);
                Upsert::Inserted
            }
        }
    }

    /// Row positions in ascending date order.
    pub fn ascending_positions(&self) -> Vec<usize> {
        let mut pos: Vec<usize> = (0..self.rows.len()).collect();
        pos.sort_by_key(|&i| self.rows[i].date);
        pos
    }

    pub(crate) fn row_at(&self, pos: usize) -> &ObservationRow {
        &self.rows[pos]
    }

    pub(crate) fn row_at_mut(&mut self, pos: usize) -> &mut ObservationRow {
        &mut self.rows[pos]
    }

    /// Last non-empty value of `field` at any date strictly before `date`.
    pub fn last_known_before(&self, field: FieldId, date: NaiveDate) -> Option<LastKnown> {
        self.rows
            .iter()
            .filter(|r| r.date < date)
            .filter_map(|r| r.value(field).map(|value| LastKnown { date: r.date, value }))
            .max_by_key(|lk| lk.date)
    }

    /// Dates (ascending) of rows missing any of `fields`.
    pub fn dates_missing(&self, fields: &[FieldId]) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .rows
            .iter()
            .filter(|r| r.missing(fields).next().is_some())
            .map(|r| r.date)
            .collect();
        dates.sort();
        dates
    }

    /// Sort rows by ascending date. Returns how many rows changed position.
    pub fn sort_by_date(&mut self) -> usize {
        let before: Vec<NaiveDate> = self.rows.iter().map(|r| r.date).collect();
        self.rows.sort_by_key(|r| r.date);
        let moved = before
            .iter()
            .zip(self.rows.iter())
            .filter(|(d, r)| **d != r.date)
            .count();
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.date, i))
            .collect();
        moved
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).min()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).max()
    }

    /// Filled / empty / malformed counts per field.
    pub fn coverage(&self, schema: &ObservationSchema) -> Vec<FieldCoverage> {
        schema
            .ids()
            .map(|id| {
                let mut cov = FieldCoverage {
                    field: schema.field(id).name.clone(),
                    filled: 0,
                    empty: 0,
                    malformed: 0,
                };
                for r in &self.rows {
                    match r.cell(id) {
                        Cell::Value(_) => cov.filled += 1,
                        Cell::Empty => cov.empty += 1,
                        Cell::Malformed(_) => cov.malformed += 1,
                    }
                }
                cov
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(date: &str, gold: Option<Decimal>) -> ObservationRow {
        let schema = ObservationSchema::market_journal();
        let mut r = ObservationRow::empty(d(date), schema.len());
        r.set(schema.find("GOLD").unwrap(), gold.into());
        r
    }

    #[test]
    fn upsert_inserts_then_replaces() {
        let schema = ObservationSchema::market_journal();
        let mut ledger = Ledger::new(&schema);
        assert_eq!(ledger.upsert(row("2025-09-05", None)), Upsert::Inserted);
        assert_eq!(
            ledger.upsert(row("2025-09-05", Some(dec!(3500)))),
            Upsert::Replaced
        );
        assert_eq!(ledger.len(), 1);
        let gold = schema.find("GOLD").unwrap();
        assert_eq!(ledger.get(d("2025-09-05")).unwrap().value(gold), Some(dec!(3500)));
    }

    #[test]
    fn last_known_ignores_file_order() {
        let schema = ObservationSchema::market_journal();
        let gold = schema.find("GOLD").unwrap();
        let mut ledger = Ledger::new(&schema);
        ledger.upsert(row("2025-09-10", Some(dec!(3)))); // later, but first in file
        ledger.upsert(row("2025-09-08", Some(dec!(2))));
        ledger.upsert(row("2025-09-09", None));

        let lk = ledger.last_known_before(gold, d("2025-09-09")).unwrap();
        assert_eq!(lk.date, d("2025-09-08"));
        assert_eq!(lk.value, dec!(2));
        assert!(ledger.last_known_before(gold, d("2025-09-08")).is_none());
    }

    #[test]
    fn sort_reports_moved_rows_and_reindexes() {
        let schema = ObservationSchema::market_journal();
        let mut ledger = Ledger::new(&schema);
        ledger.upsert(row("2025-09-10", None));
        ledger.upsert(row("2025-09-08", None));
        ledger.upsert(row("2025-09-09", None));

        assert_eq!(ledger.sort_by_date(), 3);
        assert_eq!(ledger.rows()[0].date, d("2025-09-08"));
        assert_eq!(ledger.sort_by_date(), 0);
        assert!(ledger.get(d("2025-09-10")).is_some());
    }

    #[test]
    fn dates_missing_sorted() {
        let schema = ObservationSchema::market_journal();
        let gold = schema.find("GOLD").unwrap();
        let mut ledger = Ledger::new(&schema);
        ledger.upsert(row("2025-09-10", None));
        ledger.upsert(row("2025-09-08", Some(dec!(1))));
        ledger.upsert(row("2025-09-09", None));
        assert_eq!(
            ledger.dates_missing(&[gold]),
            vec![d("2025-09-09"), d("2025-09-10")]
        );
    }
}
