//! Change records shared by reconciliation and repair reports.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Where a resolved cell value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// The cell already held the value.
    Existing,
    /// A chain step answered.
    Source { name: String, instrument: String },
    /// Last known ledger value from an earlier date.
    CarryForward { from: NaiveDate },
    /// Deterministic in-place correction by a repair pass.
    Repair { pass: String },
    Unavailable,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Existing => write!(f, "existing"),
            Provenance::Source { name, instrument } => write!(f, "{name}:{instrument}"),
            Provenance::CarryForward { from } => write!(f, "carry-forward from {from}"),
            Provenance::Repair { pass } => write!(f, "{pass}"),
            Provenance::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A (date, field) coordinate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CellRef {
    pub date: NaiveDate,
    pub field: String,
}

/// One cell mutation, with rendered before/after text at field precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellChange {
    pub date: NaiveDate,
    pub field: String,
    pub before: Option<String>,
    pub after: String,
    pub provenance: Provenance,
}

impl fmt::Display for CellChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} -> {} ({})",
            self.date,
            self.field,
            self.before.as_deref().unwrap_or("<empty>"),
            self.after,
            self.provenance
        )
    }
}
