//! Repair passes: whole-ledger batch correctors, one defect class each.
//!
//! Every pass mutates the in-memory ledger and returns a [`RepairReport`]
//! with per-field and per-date change counts. None of them writes
//! "unavailable" over a populated cell.

pub mod gap_fill;
pub mod ordering;
pub mod override_pass;
pub mod precision;
pub mod rescale;

pub use gap_fill::{gap_fill, GapFillOptions};
pub use ordering::sort_by_date;
pub use override_pass::{override_from_sources, OverrideOptions};
pub use precision::normalize_precision;
pub use rescale::{rescale, RescaleRule};

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::report::{CellChange, CellRef};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub pass: String,
    pub changes: Vec<CellChange>,
    pub per_field: BTreeMap<String, usize>,
    pub per_date: BTreeMap<NaiveDate, usize>,
    /// Target cells no source and no history could fill.
    pub unavailable: Vec<CellRef>,
    /// Cells left alone because their stored text is not a number.
    pub skipped_malformed: Vec<CellRef>,
    pub rows_reordered: usize,
}

impl RepairReport {
    pub fn new(pass: &str) -> Self {
        Self {
            pass: pass.to_string(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, change: CellChange) {
        *self.per_field.entry(change.field.clone()).or_default() += 1;
        *self.per_date.entry(change.date).or_default() += 1;
        self.changes.push(change);
    }

    /// Cells changed plus rows moved. Zero means the pass was a no-op.
    pub fn mutation_count(&self) -> usize {
        self.changes.len() + self.rows_reordered
    }
}

/// Date filter shared by the gap-fill and override passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateFilter {
    /// Only dates strictly after this one.
    pub after: Option<NaiveDate>,
    /// Only these dates, when given.
    pub dates: Option<HashSet<NaiveDate>>,
}

impl DateFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn after(date: NaiveDate) -> Self {
        Self {
            after: Some(date),
            dates: None,
        }
    }

    pub fn only(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            after: None,
            dates: Some(dates.into_iter().collect()),
        }
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        self.after.map_or(true, |a| date > a)
            && self.dates.as_ref().map_or(true, |ds| ds.contains(&date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn date_filter_combines_cutoff_and_list() {
        let f = DateFilter {
            after: Some(d("2025-09-01")),
            dates: Some([d("2025-08-29"), d("2025-09-02")].into_iter().collect()),
        };
        assert!(f.matches(d("2025-09-02")));
        assert!(!f.matches(d("2025-08-29")));
        assert!(!f.matches(d("2025-09-03")));
        assert!(DateFilter::all().matches(d("1999-01-04")));
    }
}
