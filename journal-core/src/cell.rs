//! Ledger cells and fixed-precision decimal formatting.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One numeric cell of an observation row.
///
/// `Empty` is "unavailable"; zero is an ordinary value, never a sentinel.
/// `Malformed` keeps the raw text of a stored cell that fails to parse so it
/// round-trips to disk untouched until a pass replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Cell {
    #[default]
    Empty,
    Value(Decimal),
    Malformed(String),
}

impl Cell {
    /// Parse a stored cell. Blank text is `Empty`.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return Cell::Empty;
        }
        match Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s)) {
            Ok(v) => Cell::Value(v),
            Err(_) => Cell::Malformed(raw.to_string()),
        }
    }

    /// The numeric value, if any. Malformed cells read as absent.
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Cell::Value(v) => Some(*v),
            Cell::Empty | Cell::Malformed(_) => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Cell::Value(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Cell::Malformed(_))
    }

    /// Text written to the ledger file for a field of the given precision.
    pub fn render(&self, precision: u32) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Value(v) => format_fixed(*v, precision),
            Cell::Malformed(raw) => raw.clone(),
        }
    }

    /// Text as currently held in memory, without normalization.
    pub fn raw_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Value(v) => Some(v.to_string()),
            Cell::Malformed(raw) => Some(raw.clone()),
        }
    }
}

impl From<Decimal> for Cell {
    fn from(v: Decimal) -> Self {
        Cell::Value(v)
    }
}

impl From<Option<Decimal>> for Cell {
    fn from(v: Option<Decimal>) -> Self {
        v.map_or(Cell::Empty, Cell::Value)
    }
}

/// Round half-to-even to `precision` places and pin the scale so the value
/// always renders with exactly that many fractional digits.
pub fn quantize(value: Decimal, precision: u32) -> Decimal {
    let mut q = value.round_dp_with_strategy(precision, RoundingStrategy::MidpointNearestEven);
    q.rescale(precision);
    q
}

/// True if the value already carries exactly `precision` fractional digits.
pub fn has_precision(value: Decimal, precision: u32) -> bool {
    value.scale() == precision
}

/// Render at fixed precision: `4.2` at 4 places is `"4.2000"`.
pub fn format_fixed(value: Decimal, precision: u32) -> String {
    quantize(value, precision).to_string()
}
