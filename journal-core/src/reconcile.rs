//! Reconciliation engine: build or update one row per target date.
//!
//! Every field of every target date goes through the fallback resolver, and
//! the row is then upserted by date. The engine mutates the in-memory ledger only.
//! The caller commits once per invocation.

use chrono::{Datelike, Days, Local, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cell::{quantize, Cell};
use crate::ledger::{Ledger, ObservationRow, Upsert};
use crate::report::{CellChange, CellRef, Provenance};
use crate::resolver::FallbackResolver;
use crate::schema::ObservationSchema;

/// Skip policy for dates already in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Skip fully populated rows; fill only empty cells elsewhere.
    #[default]
    WriteOnce,
    /// Re-query every field. A source hit replaces the stored value.
    Refresh,
}

impl fmt::Display for ReconcileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileMode::WriteOnce => write!(f, "write-once"),
            ReconcileMode::Refresh => write!(f, "refresh"),
        }
    }
}

impl FromStr for ReconcileMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "write-once" => Ok(ReconcileMode::WriteOnce),
            "refresh" => Ok(ReconcileMode::Refresh),
            other => Err(format!("unknown mode '{other}' (write-once|refresh)")),
        }
    }
}

/// Which dates an update run targets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetDates {
    #[default]
    Today,
    Dates(Vec<NaiveDate>),
    /// Inclusive Monday to Friday range.
    BusinessDays { from: NaiveDate, to: NaiveDate },
    /// Every ledger date missing any schema field.
    Missing,
}

impl TargetDates {
    pub fn expand(&self, ledger: &Ledger, schema: &ObservationSchema) -> Vec<NaiveDate> {
        match self {
            TargetDates::Today => vec![today()],
            TargetDates::Dates(dates) => dates.clone(),
            TargetDates::BusinessDays { from, to } => business_days(*from, *to),
            TargetDates::Missing => {
                let ids: Vec<_> = schema.ids().collect();
                ledger.dates_missing(&ids)
            }
        }
    }
}

/// Local calendar date of the machine running the job.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Weekdays in `[from, to]`, ascending. Empty when `from > to`.
pub fn business_days(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut d = from;
    while d <= to {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(d);
        }
        match d.checked_add_days(Days::new(1)) {
            Some(next) => d = next,
            None => break,
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub mode: ReconcileMode,
    pub added: Vec<NaiveDate>,
    pub updated: Vec<NaiveDate>,
    /// Existing rows visited without any cell change.
    pub unchanged: Vec<NaiveDate>,
    /// Write-once dates left alone because the row was already complete.
    pub skipped: Vec<NaiveDate>,
    pub changes: Vec<CellChange>,
    pub unavailable: Vec<CellRef>,
}

impl ReconcileReport {
    pub fn filled_cells(&self) -> usize {
        self.changes.len()
    }

    /// Rows added plus cells written. Zero means the run was a no-op.
    pub fn mutation_count(&self) -> usize {
        self.added.len() + self.changes.len()
    }
}

pub struct ReconcileEngine<'a> {
    schema: &'a ObservationSchema,
    resolver: &'a FallbackResolver,
}

impl<'a> ReconcileEngine<'a> {
    pub fn new(schema: &'a ObservationSchema, resolver: &'a FallbackResolver) -> Self {
        Self { schema, resolver }
    }

    /// Reconcile `dates`, oldest first. Repeated dates are visited once.
    pub fn reconcile(
        &self,
        ledger: &mut Ledger,
        dates: &[NaiveDate],
        mode: ReconcileMode,
    ) -> ReconcileReport {
        let mut report = ReconcileReport {
            mode,
            ..ReconcileReport::default()
        };
        // ascending, so carry-forward history never depends on request order
        let mut dates = dates.to_vec();
        dates.sort_unstable();
        dates.dedup();

        for date in dates {

            let existing = ledger.get(date).cloned();
            if mode == ReconcileMode::WriteOnce
                && existing.as_ref().is_some_and(ObservationRow::is_complete)
            {
                tracing::debug!(%date, "row complete, skipped");
                report.skipped.push(date);
                continue;
            }

            let mut row = existing.unwrap_or_else(|| ObservationRow::empty(date, ledger.width()));
            let before = report.changes.len();

            for id in self.schema.ids() {
                let field = self.schema.field(id);
                let current = row.value(id);
                let history = || ledger.last_known_before(id, date);
                let res = match mode {
                    ReconcileMode::WriteOnce => self.resolver.resolve(field, date, current, history),
                    ReconcileMode::Refresh => {
                        self.resolver.resolve_fresh(field, date, current, history)
                    }
                };

                match res.value {
                    Some(v) if res.provenance != Provenance::Existing => {
                        if current.map(|c| quantize(c, field.precision)) == Some(v) {
                            continue;
                        }
                        report.changes.push(CellChange {
                            date,
                            field: field.name.clone(),
                            before: row.cell(id).raw_text(),
                            after: v.to_string(),
                            provenance: res.provenance,
                        });
                        row.set(id, Cell::Value(v));
                    }
                    Some(_) => {}
                    None => report.unavailable.push(CellRef {
                        date,
                        field: field.name.clone(),
                    }),
                }
            }

            let changed = report.changes.len() - before;
            match ledger.upsert(row) {
                Upsert::Inserted => {
                    tracing::info!(%date, filled = changed, "row added");
                    report.added.push(date);
                }
                Upsert::Replaced if changed > 0 => {
                    tracing::info!(%date, filled = changed, "row updated");
                    report.updated.push(date);
                }
                Upsert::Replaced => report.unchanged.push(date),
            }
        }

        report
    }
}
