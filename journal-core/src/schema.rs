//! Observation schema contract — the fixed, ordered field set of the ledger.
//!
//! Defines the header order, the unit family and persisted precision of every
//! field, and the default source-priority chain each field is resolved through.
//! The ledger file header must match this order; rows may not carry columns
//! outside it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::data::{eodhd, fred, yahoo};

/// Name of the key column. Always the first header cell.
pub const DATE_COLUMN: &str = "date";

/// Default look-back for monthly macro series. Wide enough to span a late
/// publication across two month boundaries.
pub const MONTHLY_LOOKBACK_DAYS: u32 = 180;

/// Index of a field within an [`ObservationSchema`] (the date column excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub usize);

/// Semantic unit of a field's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFamily {
    /// Index level, commodity or crypto price.
    Price,
    /// A yield quoted in percent (4.25 means 4.25%).
    RatePercent,
    /// Units of quote currency per unit of base currency.
    FxRate,
}

impl UnitFamily {
    /// Decimal places persisted for a field of this family unless overridden.
    pub fn default_precision(self) -> u32 {
        match self {
            UnitFamily::Price => 2,
            UnitFamily::RatePercent | UnitFamily::FxRate => 4,
        }
    }
}

/// One step of a source-priority chain, as declared in the schema or config.
///
/// The step names a registered adapter by `source` and the provider-specific
/// identifier to ask it for. `divisor` converts a scaled provider quote back
/// to schema units at the adapter boundary (e.g. `^TNX` is the yield × 10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Daily quote: the value for exactly the target date.
    Point {
        source: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        divisor: Option<f64>,
    },
    /// Series lookup: the latest observation on or before the target date,
    /// searched within `lookback_days`.
    Series {
        source: String,
        id: String,
        #[serde(default = "default_lookback_days")]
        lookback_days: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        divisor: Option<f64>,
    },
}

fn default_lookback_days() -> u32 {
    MONTHLY_LOOKBACK_DAYS
}

impl SourceSpec {
    pub fn point(source: &str, id: &str) -> Self {
        SourceSpec::Point {
            source: source.to_string(),
            id: id.to_string(),
            divisor: None,
        }
    }

    pub fn series(source: &str, id: &str, lookback_days: u32) -> Self {
        SourceSpec::Series {
            source: source.to_string(),
            id: id.to_string(),
            lookback_days,
            divisor: None,
        }
    }

    /// Attach a divisor applied to every raw value this step returns.
    pub fn scaled_by(mut self, by: f64) -> Self {
        match &mut self {
            SourceSpec::Point { divisor, .. } | SourceSpec::Series { divisor, .. } => {
                *divisor = Some(by)
            }
        }
        self
    }

    /// Registered adapter name this step calls.
    pub fn source(&self) -> &str {
        match self {
            SourceSpec::Point { source, .. } | SourceSpec::Series { source, .. } => source,
        }
    }

    /// Provider identifier (ticker or series id).
    pub fn id(&self) -> &str {
        match self {
            SourceSpec::Point { id, .. } | SourceSpec::Series { id, .. } => id,
        }
    }

    pub fn divisor(&self) -> Option<f64> {
        match self {
            SourceSpec::Point { divisor, .. } | SourceSpec::Series { divisor, .. } => *divisor,
        }
    }
}

/// Everything the engine knows about one ledger column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Header string, exactly as it appears in the ledger file.
    pub name: String,
    pub unit: UnitFamily,
    /// Decimal places every persisted value of this field carries.
    pub precision: u32,
    /// Source-priority chain, tried in order before carry-forward.
    pub chain: Vec<SourceSpec>,
}

impl FieldDescriptor {
    pub fn new(name: &str, unit: UnitFamily, chain: Vec<SourceSpec>) -> Self {
        Self {
            name: name.to_string(),
            unit,
            precision: unit.default_precision(),
            chain,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("field name '{0}' is reserved for the key column")]
    ReservedName(String),

    #[error("duplicate field name '{0}'")]
    DuplicateField(String),

    #[error("field name must not be empty")]
    EmptyName,

    #[error("schema has no fields")]
    NoFields,
}

/// The fixed, ordered field set of the ledger (the `date` key excluded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSchema {
    fields: Vec<FieldDescriptor>,
}

impl ObservationSchema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::NoFields);
        }
        let mut seen = HashSet::new();
        for f in &fields {
            if f.name.trim().is_empty() {
                return Err(SchemaError::EmptyName);
            }
            if f.name == DATE_COLUMN {
                return Err(SchemaError::ReservedName(f.name.clone()));
            }
            if !seen.insert(f.name.as_str()) {
                return Err(SchemaError::DuplicateField(f.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    /// The market journal layout: FX, indices, 10Y yields, commodities, crypto.
    pub fn market_journal() -> Self {
        use UnitFamily::*;

        let y = |ticker: &str| vec![SourceSpec::point(yahoo::SOURCE_NAME, ticker)];
        let gov = |gbond: &str, oecd: &str| {
            vec![
                SourceSpec::point(eodhd::SOURCE_NAME, gbond),
                SourceSpec::series(fred::SOURCE_NAME, oecd, MONTHLY_LOOKBACK_DAYS),
            ]
        };

        let fields = vec![
            FieldDescriptor::new("EURO/USD", FxRate, y("EURUSD=X")),
            FieldDescriptor::new("STG/USD", FxRate, y("GBPUSD=X")),
            FieldDescriptor::new("USD/YEN", FxRate, y("JPY=X")),
            FieldDescriptor::new("NIKKEI", Price, y("^N225")),
            FieldDescriptor::new("DAX", Price, y("^GDAXI")),
            FieldDescriptor::new("FTSE", Price, y("^FTSE")),
            FieldDescriptor::new("DOW", Price, y("^DJI")),
            FieldDescriptor::new("S&P", Price, y("^GSPC")),
            FieldDescriptor::new(
                "JAPAN 10 YR (%)",
                RatePercent,
                gov("JP10Y.GBOND", "IRLTLT01JPM156N"),
            ),
            FieldDescriptor::new(
                "GERMAN 10 YR (%)",
                RatePercent,
                gov("DE10Y.GBOND", "IRLTLT01DEM156N"),
            ),
            FieldDescriptor::new(
                "UK 10 YR (%)",
                RatePercent,
                gov("UK10Y.GBOND", "IRLTLT01GBM156N"),
            ),
            FieldDescriptor::new(
                "US 10 YR (%)",
                RatePercent,
                vec![
                    // ^TNX quotes the yield in tenths of a percent
                    SourceSpec::point(yahoo::SOURCE_NAME, "^TNX").scaled_by(10.0),
                    SourceSpec::series(fred::SOURCE_NAME, "DGS10", 10),
                ],
            ),
            FieldDescriptor::new("GOLD", Price, y("GC=F")),
            FieldDescriptor::new("BRENT CRUDE", Price, y("BZ=F")),
            FieldDescriptor::new("BITCOIN", Price, y("BTC-USD")),
        ];

        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Descriptor for a field id. Panics on an id from a different schema.
    pub fn field(&self, id: FieldId) -> &FieldDescriptor {
        &self.fields[id.0]
    }

    pub fn field_mut(&mut self, id: FieldId) -> &mut FieldDescriptor {
        &mut self.fields[id.0]
    }

    /// All field ids in header order.
    pub fn ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        (0..self.fields.len()).map(FieldId)
    }

    /// Look a field up by its header name.
    pub fn find(&self, name: &str) -> Option<FieldId> {
        self.fields.iter().position(|f| f.name == name).map(FieldId)
    }

    /// Full header row, `date` first.
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(DATE_COLUMN)
            .chain(self.fields.iter().map(|f| f.name.as_str()))
            .collect()
    }
}
